//! Quality Scorer: composite score for any candidate section text.
//!
//! Pure and reproducible: no randomness, no external calls, and list outputs
//! follow input order so identical inputs serialize identically.
//!
//! - `ats = round(critical_ratio × 50 + important_ratio × 30 + 20)`
//! - `requirements = round(addressed / total × 100)`, or 80 with no requirements
//! - `competitive_raw = 20 + 40 × [quantified metric] + 40 × [strong verb]`,
//!   reported on a 1 – 5 scale as `clamp(round(raw / 20), 1, 5)`
//! - `overall = round(ats × 0.4 + requirements × 0.3 + competitive_raw × 0.3)`

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::InputError;
use crate::models::{check_requirements, AtsKeywords, Requirement};
use crate::text::{contains_ci, term_overlap, tokenize};

/// Action verbs that signal ownership of an outcome.
pub const STRONG_ACTION_VERBS: &[&str] = &[
    "accelerated",
    "architected",
    "automated",
    "built",
    "delivered",
    "designed",
    "drove",
    "established",
    "grew",
    "implemented",
    "increased",
    "launched",
    "led",
    "mentored",
    "negotiated",
    "optimized",
    "owned",
    "reduced",
    "scaled",
    "shipped",
    "spearheaded",
    "streamlined",
    "transformed",
];

/// Heuristic weights. Defaults carry the calibrated constants; none of them
/// has been validated against hiring outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub critical_points: f64,
    pub important_points: f64,
    pub structure_points: f64,
    pub no_requirements_coverage: u32,
    /// Share of a requirement's significant terms the text must contain to address it.
    pub requirement_match_overlap: f64,
    pub competitive_base: u32,
    pub metric_points: u32,
    pub verb_points: u32,
    pub ats_weight: f64,
    pub requirements_weight: f64,
    pub competitive_weight: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            critical_points: 50.0,
            important_points: 30.0,
            structure_points: 20.0,
            no_requirements_coverage: 80,
            requirement_match_overlap: 0.5,
            competitive_base: 20,
            metric_points: 40,
            verb_points: 40,
            ats_weight: 0.4,
            requirements_weight: 0.3,
            competitive_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub overall: u32,
    pub ats_match_percentage: u32,
    pub requirements_coverage: u32,
    pub competitive_strength: u8,
    pub keywords_matched: Vec<String>,
    pub requirements_addressed: Vec<String>,
}

pub fn score_section(
    text: &str,
    ats_keywords: &AtsKeywords,
    requirements: &[Requirement],
    weights: &QualityWeights,
) -> Result<QualityScore, InputError> {
    check_requirements(requirements)?;

    let critical_matched = matched_in(text, &ats_keywords.critical);
    let important_matched = matched_in(text, &ats_keywords.important);
    let nice_matched = matched_in(text, &ats_keywords.nice_to_have);

    let ats_raw = ratio(critical_matched.len(), ats_keywords.critical.len())
        * weights.critical_points
        + ratio(important_matched.len(), ats_keywords.important.len()) * weights.important_points
        + weights.structure_points;
    let ats_match_percentage = ats_raw.round().clamp(0.0, 100.0) as u32;

    let requirements_addressed: Vec<String> = requirements
        .iter()
        .filter(|r| addresses(text, &r.text, weights.requirement_match_overlap))
        .map(|r| r.text.clone())
        .collect();
    let requirements_coverage = if requirements.is_empty() {
        weights.no_requirements_coverage
    } else {
        (ratio(requirements_addressed.len(), requirements.len()) * 100.0).round() as u32
    };

    let competitive_raw = competitive_raw(text, weights);
    let competitive_strength = ((competitive_raw as f64 / 20.0).round() as i64).clamp(1, 5) as u8;

    let overall = (ats_match_percentage as f64 * weights.ats_weight
        + requirements_coverage as f64 * weights.requirements_weight
        + competitive_raw as f64 * weights.competitive_weight)
        .round()
        .clamp(0.0, 100.0) as u32;

    let mut keywords_matched: Vec<String> = Vec::new();
    for kw in critical_matched
        .into_iter()
        .chain(important_matched)
        .chain(nice_matched)
    {
        if !keywords_matched.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
            keywords_matched.push(kw.to_string());
        }
    }

    Ok(QualityScore {
        overall,
        ats_match_percentage,
        requirements_coverage,
        competitive_strength,
        keywords_matched,
        requirements_addressed,
    })
}

/// Raw competitive signal: base plus points for a quantified metric and a strong verb.
pub fn competitive_raw(text: &str, weights: &QualityWeights) -> u32 {
    let mut raw = weights.competitive_base;
    if has_quantified_metric(text) {
        raw += weights.metric_points;
    }
    if has_strong_action_verb(text) {
        raw += weights.verb_points;
    }
    raw.min(100)
}

/// A number adjacent to `%`, `$`, `K`, `M`, or `+` (e.g. "40%", "$2M", "10K", "5+").
pub fn has_quantified_metric(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\$\s?\d|\d[\d,.]*\s?(?:%|\+|[KkMm]\b)")
                .expect("metric pattern is a valid regex")
        })
        .is_match(text)
}

pub fn has_strong_action_verb(text: &str) -> bool {
    tokenize(text)
        .iter()
        .any(|t| STRONG_ACTION_VERBS.contains(&t.as_str()))
}

fn matched_in<'a>(text: &str, keywords: &'a [String]) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|kw| contains_ci(text, kw))
        .map(String::as_str)
        .collect()
}

fn addresses(text: &str, requirement: &str, min_overlap: f64) -> bool {
    contains_ci(text, requirement) || term_overlap(requirement, text) >= min_overlap
}

fn ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evidence::fixtures::requirement;
    use crate::models::RequirementPriority;

    fn keywords(critical: &[&str], important: &[&str], nice: &[&str]) -> AtsKeywords {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        AtsKeywords {
            critical: owned(critical),
            important: owned(important),
            nice_to_have: owned(nice),
        }
    }

    #[test]
    fn test_both_critical_keywords_score_at_least_70() {
        let score = score_section(
            "Built Python services on AWS",
            &keywords(&["Python", "AWS"], &[], &[]),
            &[],
            &QualityWeights::default(),
        )
        .unwrap();
        assert!(score.ats_match_percentage >= 70);
        assert_eq!(score.ats_match_percentage, 70);
        assert_eq!(score.keywords_matched, vec!["Python", "AWS"]);
    }

    #[test]
    fn test_ats_formula_with_partial_lists() {
        // 1/2 critical → 25, 1/3 important → 10, +20 = 55
        let score = score_section(
            "Python and Docker",
            &keywords(&["Python", "AWS"], &["Docker", "Terraform", "Go"], &[]),
            &[],
            &QualityWeights::default(),
        )
        .unwrap();
        assert_eq!(score.ats_match_percentage, 55);
    }

    #[test]
    fn test_empty_keyword_lists_leave_structure_points_only() {
        let score =
            score_section("anything", &AtsKeywords::default(), &[], &QualityWeights::default())
                .unwrap();
        assert_eq!(score.ats_match_percentage, 20);
    }

    #[test]
    fn test_no_requirements_defaults_coverage_to_80() {
        let score =
            score_section("text", &AtsKeywords::default(), &[], &QualityWeights::default())
                .unwrap();
        assert_eq!(score.requirements_coverage, 80);
    }

    #[test]
    fn test_requirements_coverage_counts_addressed() {
        let reqs = vec![
            requirement("Kubernetes operations", RequirementPriority::Required),
            requirement("Team leadership", RequirementPriority::Preferred),
        ];
        let score = score_section(
            "Ran Kubernetes operations for 40 clusters",
            &AtsKeywords::default(),
            &reqs,
            &QualityWeights::default(),
        )
        .unwrap();
        assert_eq!(score.requirements_coverage, 50);
        assert_eq!(score.requirements_addressed, vec!["Kubernetes operations"]);
    }

    #[test]
    fn test_competitive_strength_levels() {
        let w = QualityWeights::default();
        assert_eq!(competitive_raw("Worked on things", &w), 20);
        assert_eq!(competitive_raw("Led the platform team", &w), 60);
        assert_eq!(competitive_raw("Led a migration that cut costs 40%", &w), 100);

        let plain = score_section("Worked on things", &AtsKeywords::default(), &[], &w).unwrap();
        assert_eq!(plain.competitive_strength, 1);
        let strong = score_section(
            "Led a migration that cut costs 40%",
            &AtsKeywords::default(),
            &[],
            &w,
        )
        .unwrap();
        assert_eq!(strong.competitive_strength, 5);
    }

    #[test]
    fn test_metric_detection() {
        assert!(has_quantified_metric("cut latency 40%"));
        assert!(has_quantified_metric("saved $50,000"));
        assert!(has_quantified_metric("served 10K users"));
        assert!(has_quantified_metric("raised 2M in ARR"));
        assert!(has_quantified_metric("5+ years"));
        assert!(!has_quantified_metric("5 years"));
        assert!(!has_quantified_metric("no numbers here"));
    }

    #[test]
    fn test_overall_formula() {
        // ats 70, requirements 80 (none given), competitive raw 100
        // round(28 + 24 + 30) = 82
        let score = score_section(
            "Led Python services on AWS, cutting spend 30%",
            &keywords(&["Python", "AWS"], &[], &[]),
            &[],
            &QualityWeights::default(),
        )
        .unwrap();
        assert_eq!(score.overall, 82);
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let w = QualityWeights::default();
        let kw = keywords(&["a"], &["b"], &["c"]);
        for text in ["", "a b c", "Led 100% of $5M +", "zzz"] {
            let s = score_section(text, &kw, &[], &w).unwrap();
            assert!(s.overall <= 100);
            assert!((1..=5).contains(&s.competitive_strength));
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let reqs = vec![requirement("Rust services", RequirementPriority::Required)];
        let kw = keywords(&["Rust", "gRPC"], &["Tokio"], &["Kafka"]);
        let text = "Built Rust services with Tokio and Kafka, cutting p99 latency 35%";
        let w = QualityWeights::default();

        let first = serde_json::to_vec(&score_section(text, &kw, &reqs, &w).unwrap()).unwrap();
        let second = serde_json::to_vec(&score_section(text, &kw, &reqs, &w).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_requirement_is_input_error() {
        let reqs = vec![requirement(" ", RequirementPriority::Required)];
        assert!(score_section("x", &AtsKeywords::default(), &reqs, &QualityWeights::default())
            .is_err());
    }
}
