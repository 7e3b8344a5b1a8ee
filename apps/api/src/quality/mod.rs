pub mod handlers;
pub mod scorer;

pub use scorer::{score_section, QualityScore, QualityWeights};
