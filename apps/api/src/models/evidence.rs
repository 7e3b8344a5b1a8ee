use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::InputError;

/// A single verifiable fact or achievement from the user's career history.
/// Owned by the evidence store; the pipeline only attaches a transient
/// `relevance_score` per ranking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub required_flag: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementPriority {
    Required,
    Preferred,
    NiceToHave,
}

/// One discrete qualification extracted from a target job description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub text: String,
    pub priority: RequirementPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_position: Option<u32>,
}

/// ATS keyword lists, tiered by how heavily an applicant-tracking system weighs them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsKeywords {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub important: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
}

/// An evidence statement handed to rewrite and validation calls, with the
/// user's self-reported confidence in it (0.0 – 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceClaim {
    pub evidence_id: String,
    pub claim: String,
    pub confidence: f64,
}

impl From<&EvidenceItem> for EvidenceClaim {
    fn from(item: &EvidenceItem) -> Self {
        Self {
            evidence_id: item.id.clone(),
            claim: item.text.clone(),
            confidence: 1.0,
        }
    }
}

pub fn check_requirements(requirements: &[Requirement]) -> Result<(), InputError> {
    match requirements.iter().position(|r| r.text.trim().is_empty()) {
        Some(index) => Err(InputError::EmptyRequirement { index }),
        None => Ok(()),
    }
}

pub fn check_evidence(items: &[EvidenceItem]) -> Result<(), InputError> {
    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        if item.id.trim().is_empty() {
            return Err(InputError::MissingEvidenceId { index });
        }
        if !seen.insert(item.id.as_str()) {
            return Err(InputError::DuplicateEvidenceId {
                id: item.id.clone(),
            });
        }
    }
    Ok(())
}

pub fn check_claims(claims: &[EvidenceClaim]) -> Result<(), InputError> {
    for claim in claims {
        if !(0.0..=1.0).contains(&claim.confidence) {
            return Err(InputError::ClaimConfidenceOutOfRange {
                evidence_id: claim.evidence_id.clone(),
                confidence: claim.confidence,
            });
        }
    }
    Ok(())
}
