pub mod binding;
pub mod entropy;

pub use self::binding::{compose_binding, DeltaTerms, ModelResult};
pub use self::entropy::{c2_entropy, interaction_entropy, C2Entropy, InteractionEntropy};
