// Dual Variant Generator: ideal vs personalized section rendering with
// deterministic arbitration between them.

pub mod arbitration;
pub mod generator;
pub mod handlers;
pub mod prompts;

pub use arbitration::{ArbitrationThresholds, Recommendation, VariantComparison};
pub use generator::{
    arbitrate_variants, generate_dual_variants, generate_variant, DualVariantResult, SectionSpec,
    SectionVariant, VariantStrategy,
};
