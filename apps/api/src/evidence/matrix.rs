//! Evidence Matrix: maps each job requirement to at most one evidence item.
//!
//! Pure function of its inputs. Selection runs the ranker against the
//! requirement's own text; the match score (0 – 100) is
//! `KEYWORD_WEIGHT × [any item keyword in requirement] + TERM_WEIGHT × term overlap`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::InputError;
use crate::evidence::ranker::rank_evidence;
use crate::models::{check_evidence, check_requirements, EvidenceItem, Requirement};
use crate::text::{contains_ci, term_overlap};

const KEYWORD_WEIGHT: f64 = 40.0;
const TERM_WEIGHT: f64 = 60.0;

pub const COVERED_THRESHOLD: u32 = 80;
pub const PARTIAL_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    Covered,
    Partial,
    Weak,
    Uncovered,
}

impl CoverageStatus {
    /// `None` means no evidence was selected.
    pub fn from_match(score: Option<u32>) -> Self {
        match score {
            None => CoverageStatus::Uncovered,
            Some(s) if s >= COVERED_THRESHOLD => CoverageStatus::Covered,
            Some(s) if s >= PARTIAL_THRESHOLD => CoverageStatus::Partial,
            Some(_) => CoverageStatus::Weak,
        }
    }

    pub fn counts_as_coverage(self) -> bool {
        matches!(self, CoverageStatus::Covered | CoverageStatus::Partial)
    }
}

/// Whether one evidence item may back several requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    #[default]
    Shared,
    /// One-to-one: higher-priority requirements consume items first.
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMatrixRow {
    pub requirement: Requirement,
    pub selected_evidence: Option<EvidenceItem>,
    pub match_score: u32,
    pub status: CoverageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMatrix {
    pub rows: Vec<EvidenceMatrixRow>,
    /// `None` when there are no requirements: coverage is undefined, not 0 or 100.
    pub coverage_percent: Option<u32>,
}

impl EvidenceMatrix {
    pub fn uncovered(&self) -> impl Iterator<Item = &Requirement> {
        self.rows
            .iter()
            .filter(|r| r.status == CoverageStatus::Uncovered)
            .map(|r| &r.requirement)
    }
}

/// Match strength (0 – 100) of one evidence item for a requirement or target text.
pub fn match_score(target_text: &str, item: &EvidenceItem) -> u32 {
    let keyword_signal = if item.keywords.iter().any(|kw| contains_ci(target_text, kw)) {
        1.0
    } else {
        0.0
    };
    let overlap = term_overlap(target_text, &item.text);
    (KEYWORD_WEIGHT * keyword_signal + TERM_WEIGHT * overlap)
        .round()
        .clamp(0.0, 100.0) as u32
}

/// Builds one row per requirement, in input order.
pub fn build_evidence_matrix(
    requirements: &[Requirement],
    items: &[EvidenceItem],
    policy: AllocationPolicy,
) -> Result<EvidenceMatrix, InputError> {
    check_requirements(requirements)?;
    check_evidence(items)?;

    // Exclusive allocation visits requirements by priority; sort is stable so
    // equal priorities keep input order.
    let mut visit_order: Vec<usize> = (0..requirements.len()).collect();
    if policy == AllocationPolicy::Exclusive {
        visit_order.sort_by_key(|&i| requirements[i].priority);
    }

    let mut consumed: HashSet<String> = HashSet::new();
    let mut rows: Vec<Option<EvidenceMatrixRow>> = vec![None; requirements.len()];

    for index in visit_order {
        let requirement = &requirements[index];
        let available: Vec<EvidenceItem> = items
            .iter()
            .filter(|item| !consumed.contains(&item.id))
            .cloned()
            .collect();

        let ranking = rank_evidence(&requirement.text, &available)?;
        let selected = ranking
            .items
            .into_iter()
            .find(|r| r.relevance() > 0)
            .map(|r| r.item);

        let score = selected
            .as_ref()
            .map(|item| match_score(&requirement.text, item));

        if policy == AllocationPolicy::Exclusive {
            if let Some(item) = &selected {
                consumed.insert(item.id.clone());
            }
        }

        rows[index] = Some(EvidenceMatrixRow {
            requirement: requirement.clone(),
            selected_evidence: selected,
            match_score: score.unwrap_or(0),
            status: CoverageStatus::from_match(score),
        });
    }

    let rows: Vec<EvidenceMatrixRow> = rows.into_iter().flatten().collect();
    let coverage_percent = coverage_percent(&rows);

    Ok(EvidenceMatrix {
        rows,
        coverage_percent,
    })
}

fn coverage_percent(rows: &[EvidenceMatrixRow]) -> Option<u32> {
    if rows.is_empty() {
        return None;
    }
    let covered = rows
        .iter()
        .filter(|r| r.status.counts_as_coverage())
        .count();
    Some(((covered as f64 / rows.len() as f64) * 100.0).round() as u32)
}

/// Mean per-item match score (0 – 100) across `items`, or 0 when there are none.
///
/// Each item contributes its best score over `requirements`, or its score
/// against `fallback_text` when no requirements are given.
pub fn evidence_strength(
    items: &[EvidenceItem],
    requirements: &[Requirement],
    fallback_text: &str,
) -> u32 {
    if items.is_empty() {
        return 0;
    }
    let total: u32 = items
        .iter()
        .map(|item| {
            if requirements.is_empty() {
                match_score(fallback_text, item)
            } else {
                requirements
                    .iter()
                    .map(|r| match_score(&r.text, item))
                    .max()
                    .unwrap_or(0)
            }
        })
        .sum();
    (total as f64 / items.len() as f64).round() as u32
}
