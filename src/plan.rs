pub mod builder;
pub mod frames;

pub use self::builder::{build_plan, CalcStep, PlanContext, PlannedStep, SystemFiles};
pub use self::frames::{FramePlan, TrajectoryCounts, TrajectoryProtocol};
