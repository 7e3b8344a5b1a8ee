//! Rewrite Validator: checks an AI rewrite against the user's evidence claims.
//!
//! Two passes, merged:
//! 1. A deterministic grounding pre-check that flags organisations, figures,
//!    and proper nouns introduced by the rewrite but absent from the original
//!    text and every evidence claim.
//! 2. A constrained generation call that reports further issues. Only issues
//!    whose `problematicText` is a verbatim span of the rewrite are kept.
//!
//! The verdict is fixed by severity: any critical issue rejects, any warning
//! (or an inconclusive audit) asks for revision, otherwise approve. An
//! inconclusive audit is never upgraded to approve.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::InputError;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, VERBATIM_SPAN_INSTRUCTION};
use crate::llm_client::{generate_json, GenerationCapability, GenerationRequest};
use crate::models::{check_claims, EvidenceClaim};
use crate::rewrite::prompts::VALIDATION_PROMPT_TEMPLATE;
use crate::text::{contains_ci, term_overlap, tokenize};

pub const VALIDATION_TEMPERATURE: f32 = 0.1;
pub const VALIDATION_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Confidence lost for each reported issue that did not quote the rewrite verbatim.
const UNQUOTED_ISSUE_PENALTY: f64 = 0.1;
/// Share of a claim's terms a sentence must repeat to count as relying on it.
const CLAIM_RELIANCE_OVERLAP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Hallucination,
    Exaggeration,
    UnsupportedClaim,
    MissingEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Revise,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// Exact span of the rewritten text.
    pub problematic_text: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub confidence: f64,
    pub issues: Vec<ValidationIssue>,
    pub recommendation: Verdict,
    /// The audit could not reach a confident verdict.
    #[serde(default)]
    pub inconclusive: bool,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>, confidence: f64, inconclusive: bool) -> Self {
        let recommendation = verdict_for(&issues, inconclusive);
        Self {
            valid: recommendation == Verdict::Approve,
            confidence: confidence.clamp(0.0, 1.0),
            issues,
            recommendation,
            inconclusive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Audits reporting less confidence than this are inconclusive.
    pub min_confidence: f64,
    /// Claims below this self-reported confidence are flagged when relied upon.
    pub low_confidence_claim: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            low_confidence_claim: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuditResponse {
    confidence: f64,
    #[serde(default)]
    issues: Vec<ValidationIssue>,
}

pub fn verdict_for(issues: &[ValidationIssue], inconclusive: bool) -> Verdict {
    match issues.iter().map(|i| i.severity).max() {
        Some(Severity::Critical) => Verdict::Reject,
        Some(Severity::Warning) => Verdict::Revise,
        _ if inconclusive => Verdict::Revise,
        _ => Verdict::Approve,
    }
}

pub async fn validate_rewrite(
    generator: &dyn GenerationCapability,
    original: &str,
    rewritten: &str,
    claims: &[EvidenceClaim],
    section: &str,
    policy: &ValidationPolicy,
) -> Result<ValidationResult, InputError> {
    if rewritten.trim().is_empty() {
        return Err(InputError::EmptyField { field: "rewritten" });
    }
    check_claims(claims)?;

    let mut issues = precheck(original, rewritten, claims, policy);

    let request = GenerationRequest::new(
        build_validation_prompt(original, rewritten, claims, section, &issues),
        VALIDATION_TEMPERATURE,
        VALIDATION_MAX_OUTPUT_TOKENS,
    )
    .with_system(JSON_ONLY_SYSTEM);

    let (confidence, inconclusive) =
        match generate_json::<AuditResponse>(generator, request).await {
            Ok(audit) => {
                let mut confidence = audit.confidence.clamp(0.0, 1.0);
                for issue in audit.issues {
                    if !rewritten.contains(issue.problematic_text.as_str())
                        || issue.problematic_text.trim().is_empty()
                    {
                        warn!(
                            "Dropping {:?} issue that does not quote the rewrite: {:?}",
                            issue.kind, issue.problematic_text
                        );
                        confidence = (confidence - UNQUOTED_ISSUE_PENALTY).max(0.0);
                        continue;
                    }
                    push_unique(&mut issues, issue);
                }
                (confidence, confidence < policy.min_confidence)
            }
            Err(e) => {
                warn!("Validation audit for '{section}' failed, result is inconclusive: {e}");
                (0.0, true)
            }
        };

    let result = ValidationResult::from_issues(issues, confidence, inconclusive);
    info!(
        "Validated '{section}': {:?} ({} issues, confidence {:.2}{})",
        result.recommendation,
        result.issues.len(),
        result.confidence,
        if inconclusive { ", inconclusive" } else { "" }
    );
    Ok(result)
}

// ────────────────────────────────────────────────────────────────────────────
// Deterministic grounding pre-check
// ────────────────────────────────────────────────────────────────────────────

fn org_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?i:at|for|with|joined|from)\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*)*)")
            .expect("organisation pattern is a valid regex")
    })
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$?\d[\d,.]*(?:%|\+|[KkMm]\b)?").expect("number pattern is a valid regex")
    })
}

/// Issues found without calling out, in order of appearance per rule.
pub fn precheck(
    original: &str,
    rewritten: &str,
    claims: &[EvidenceClaim],
    policy: &ValidationPolicy,
) -> Vec<ValidationIssue> {
    let mut corpus = original.to_string();
    for claim in claims {
        corpus.push('\n');
        corpus.push_str(&claim.claim);
    }
    let corpus_tokens: BTreeSet<String> = tokenize(&corpus).into_iter().collect();

    let mut issues = Vec::new();
    let mut flagged_words: BTreeSet<String> = BTreeSet::new();

    for capture in org_pattern().captures_iter(rewritten) {
        let Some(span) = capture.get(1) else { continue };
        let span = span.as_str();
        if contains_ci(&corpus, span) {
            continue;
        }
        flagged_words.extend(tokenize(span));
        push_unique(
            &mut issues,
            ValidationIssue {
                kind: IssueKind::Hallucination,
                severity: Severity::Critical,
                problematic_text: span.to_string(),
                suggestion: format!(
                    "'{span}' appears in no evidence claim; remove it or add evidence for it"
                ),
            },
        );
    }

    let known_figures: BTreeSet<String> = number_pattern()
        .find_iter(&corpus)
        .map(|m| figure_core(m.as_str()).to_string())
        .collect();
    for m in number_pattern().find_iter(rewritten) {
        let figure = m.as_str().trim_end_matches(['.', ',']);
        if known_figures.contains(figure_core(figure)) {
            continue;
        }
        push_unique(
            &mut issues,
            ValidationIssue {
                kind: IssueKind::Exaggeration,
                severity: Severity::Warning,
                problematic_text: figure.to_string(),
                suggestion: format!("'{figure}' is not in the evidence; use the figure the evidence states"),
            },
        );
    }

    for term in new_proper_nouns(rewritten) {
        let tokens = tokenize(&term);
        if tokens.iter().all(|t| corpus_tokens.contains(t))
            || tokens.iter().any(|t| flagged_words.contains(t))
        {
            continue;
        }
        push_unique(
            &mut issues,
            ValidationIssue {
                kind: IssueKind::UnsupportedClaim,
                severity: Severity::Warning,
                suggestion: format!("No evidence mentions '{term}'"),
                problematic_text: term,
            },
        );
    }

    for claim in claims
        .iter()
        .filter(|c| c.confidence < policy.low_confidence_claim)
    {
        let Some(sentence) = sentences(rewritten)
            .find(|s| term_overlap(&claim.claim, s) >= CLAIM_RELIANCE_OVERLAP)
        else {
            continue;
        };
        push_unique(
            &mut issues,
            ValidationIssue {
                kind: IssueKind::MissingEvidence,
                severity: Severity::Info,
                problematic_text: sentence.to_string(),
                suggestion: format!(
                    "Relies on evidence '{}' which you rated {:.0}% confident; confirm it before using",
                    claim.evidence_id,
                    claim.confidence * 100.0
                ),
            },
        );
    }

    issues
}

/// Digits of a figure with currency, unit, and trailing punctuation removed.
fn figure_core(figure: &str) -> &str {
    figure.trim_matches(|c: char| !c.is_ascii_digit())
}

/// Capitalised words that do not start a sentence or line.
fn new_proper_nouns(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in text.lines() {
        let mut sentence_start = true;
        for raw in line.split_whitespace() {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
            if starts_upper
                && !sentence_start
                && word.chars().count() > 1
                && !found.iter().any(|w: &String| w == word)
            {
                found.push(word.to_string());
            }
            if !word.is_empty() {
                sentence_start = raw.ends_with(['.', '!', '?', ':', ';']);
            }
        }
    }
    found
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '•'))
        .filter(|s| !s.is_empty())
}

fn push_unique(issues: &mut Vec<ValidationIssue>, issue: ValidationIssue) {
    let duplicate = issues
        .iter()
        .any(|i| i.kind == issue.kind && i.problematic_text == issue.problematic_text);
    if !duplicate {
        issues.push(issue);
    }
}

fn build_validation_prompt(
    original: &str,
    rewritten: &str,
    claims: &[EvidenceClaim],
    section: &str,
    precheck: &[ValidationIssue],
) -> String {
    let claims_json = serde_json::to_string_pretty(claims).unwrap_or_else(|_| "[]".to_string());
    let precheck_json =
        serde_json::to_string_pretty(precheck).unwrap_or_else(|_| "[]".to_string());

    VALIDATION_PROMPT_TEMPLATE
        .replace("{verbatim_instruction}", VERBATIM_SPAN_INSTRUCTION)
        .replace("{section}", section)
        .replace("{original}", original)
        .replace("{rewritten}", rewritten)
        .replace("{claims_json}", &claims_json)
        .replace("{precheck_json}", &precheck_json)
}
