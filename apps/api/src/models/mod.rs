pub mod evidence;

pub use evidence::{
    check_claims, check_evidence, check_requirements, AtsKeywords, EvidenceClaim, EvidenceItem,
    Requirement, RequirementPriority,
};
