pub mod decomp;
pub mod energy;
pub mod outputs;

pub use self::decomp::DecompOutput;
pub use self::energy::{Diff, EnergyVector};
pub use self::outputs::{EnergyTerms, Model, QhOutput};
