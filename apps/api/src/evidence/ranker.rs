//! Evidence Ranker: scores evidence items against a job description or requirement.
//!
//! No LLM calls. Relevance is lexical:
//! - each item keyword found in the target (case-insensitive substring) → `KEYWORD_HIT_POINTS`
//! - each significant target term present in the item text → `TERM_HIT_POINTS`
//!
//! Scores are integers on an open range (conventionally 0 – 10).

use serde::{Deserialize, Serialize};

use crate::errors::InputError;
use crate::models::{check_evidence, EvidenceItem};
use crate::text::{contains_ci, significant_terms, tokenize};

pub const KEYWORD_HIT_POINTS: u32 = 3;
pub const TERM_HIT_POINTS: u32 = 1;

/// Whether the ranking had any target text to rank against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingContext {
    Scored,
    NoRankingContext,
}

/// An evidence item annotated with its relevance for one ranking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    #[serde(flatten)]
    pub item: EvidenceItem,
    pub matched_keywords: Vec<String>,
}

impl RankedItem {
    pub fn relevance(&self) -> u32 {
        self.item.relevance_score.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingOutcome {
    pub context: RankingContext,
    pub items: Vec<RankedItem>,
}

/// Ranks `items` against `target_text`, highest relevance first.
///
/// Equal scores keep input order. An empty target yields all-zero scores and
/// `RankingContext::NoRankingContext` rather than invented ones.
pub fn rank_evidence(
    target_text: &str,
    items: &[EvidenceItem],
) -> Result<RankingOutcome, InputError> {
    check_evidence(items)?;

    if target_text.trim().is_empty() {
        return Ok(RankingOutcome {
            context: RankingContext::NoRankingContext,
            items: items
                .iter()
                .map(|item| annotate(item, 0, Vec::new()))
                .collect(),
        });
    }

    let target_terms = significant_terms(target_text);

    let mut ranked: Vec<RankedItem> = items
        .iter()
        .map(|item| {
            let matched_keywords: Vec<String> = item
                .keywords
                .iter()
                .filter(|kw| contains_ci(target_text, kw))
                .cloned()
                .collect();

            let item_tokens = tokenize(&item.text);
            let term_hits = target_terms
                .iter()
                .filter(|t| item_tokens.contains(t))
                .count() as u32;

            let score =
                KEYWORD_HIT_POINTS * matched_keywords.len() as u32 + TERM_HIT_POINTS * term_hits;
            annotate(item, score, matched_keywords)
        })
        .collect();

    // Vec::sort_by is stable, so ties keep input order
    ranked.sort_by(|a, b| b.relevance().cmp(&a.relevance()));

    Ok(RankingOutcome {
        context: RankingContext::Scored,
        items: ranked,
    })
}

/// Truncates a ranking to `limit` items, then appends any required items that
/// fell below the cut so must-include evidence is always reachable.
pub fn top_ranked(outcome: &RankingOutcome, limit: usize) -> Vec<RankedItem> {
    let mut selected: Vec<RankedItem> = outcome.items.iter().take(limit).cloned().collect();
    selected.extend(
        outcome
            .items
            .iter()
            .skip(limit)
            .filter(|r| r.item.required_flag)
            .cloned(),
    );
    selected
}

fn annotate(item: &EvidenceItem, score: u32, matched_keywords: Vec<String>) -> RankedItem {
    let mut item = item.clone();
    item.relevance_score = Some(score);
    RankedItem {
        item,
        matched_keywords,
    }
}
