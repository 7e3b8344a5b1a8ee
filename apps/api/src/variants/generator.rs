//! Dual Variant Generator: two competing renderings of one resume section.
//!
//! Flow: validate inputs → rank evidence → generate ideal ‖ personalized
//!       (concurrently) → score each → arbitrate once both are in.
//!
//! A failed generation call never discards the other variant. The result
//! carries whichever variants succeeded plus a typed failure per missing one;
//! `comparison` is only produced when both variants exist.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{InputError, StepFailure};
use crate::evidence::matrix::evidence_strength;
use crate::evidence::ranker::rank_evidence;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{GenerationCapability, GenerationRequest, LlmError};
use crate::models::{check_requirements, AtsKeywords, EvidenceItem, Requirement};
use crate::quality::{score_section, QualityScore, QualityWeights};
use crate::text::{contains_ci, term_overlap};
use crate::variants::arbitration::{arbitrate, ArbitrationThresholds, VariantComparison};
use crate::variants::prompts::{
    IDEAL_PROMPT_TEMPLATE, PERSONALIZED_PROMPT_TEMPLATE, VARIANT_SYSTEM,
};

pub const IDEAL_TEMPERATURE: f32 = 0.7;
pub const PERSONALIZED_TEMPERATURE: f32 = 0.4;
pub const VARIANT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// An evidence item counts as used when this share of its terms shows up in the content.
const EVIDENCE_USE_OVERLAP: f64 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStrategy {
    Ideal,
    Personalized,
}

/// The target section a dual-variant call renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpec {
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    pub job_description: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub ats_keywords: AtsKeywords,
    /// Free-form guidance appended to both prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionVariant {
    pub strategy: VariantStrategy,
    pub content: String,
    pub quality: QualityScore,
    pub evidence_items_used: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFailure {
    pub strategy: VariantStrategy,
    #[serde(flatten)]
    pub failure: StepFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualVariantResult {
    pub ideal: Option<SectionVariant>,
    pub personalized: Option<SectionVariant>,
    pub comparison: Option<VariantComparison>,
    #[serde(default)]
    pub failures: Vec<VariantFailure>,
}

impl DualVariantResult {
    pub fn is_complete(&self) -> bool {
        self.ideal.is_some() && self.personalized.is_some()
    }

    pub fn variant(&self, strategy: VariantStrategy) -> Option<&SectionVariant> {
        match strategy {
            VariantStrategy::Ideal => self.ideal.as_ref(),
            VariantStrategy::Personalized => self.personalized.as_ref(),
        }
    }

    /// Folds a newer result into this one. A strategy missing from `newer`
    /// keeps its earlier variant; failures are replaced by the newer ones.
    /// The comparison only survives when `newer` carried both variants.
    pub fn merge(&mut self, newer: DualVariantResult) {
        let DualVariantResult {
            ideal,
            personalized,
            comparison,
            failures,
        } = newer;
        if ideal.is_some() {
            self.ideal = ideal;
        }
        if personalized.is_some() {
            self.personalized = personalized;
        }
        self.comparison = comparison;
        self.failures = failures;
    }

    fn slot(&mut self, strategy: VariantStrategy) -> &mut Option<SectionVariant> {
        match strategy {
            VariantStrategy::Ideal => &mut self.ideal,
            VariantStrategy::Personalized => &mut self.personalized,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generation pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Generates, scores, and arbitrates the ideal and personalized variants.
///
/// Returns `Err` only for malformed input. Generation failures are folded into
/// `DualVariantResult::failures`.
pub async fn generate_dual_variants(
    generator: &dyn GenerationCapability,
    spec: &SectionSpec,
    evidence: &[EvidenceItem],
    weights: &QualityWeights,
    thresholds: &ArbitrationThresholds,
) -> Result<DualVariantResult, InputError> {
    let ranked = prepare(spec, evidence)?;

    let ideal_request = variant_request(VariantStrategy::Ideal, spec, &ranked);
    let personalized_request = variant_request(VariantStrategy::Personalized, spec, &ranked);
    let (ideal_text, personalized_text) = tokio::join!(
        generate_content(generator, ideal_request),
        generate_content(generator, personalized_request),
    );

    let mut failures = Vec::new();
    let ideal = score_variant(
        VariantStrategy::Ideal,
        ideal_text,
        spec,
        &ranked,
        weights,
        &mut failures,
    )?;
    let personalized = score_variant(
        VariantStrategy::Personalized,
        personalized_text,
        spec,
        &ranked,
        weights,
        &mut failures,
    )?;

    let mut result = DualVariantResult {
        ideal,
        personalized,
        comparison: None,
        failures,
    };
    arbitrate_variants(&mut result, spec, evidence, thresholds);
    Ok(result)
}

/// Regenerates one strategy. The result carries only that variant (or its
/// failure) and no comparison; merge it into the earlier set and arbitrate.
pub async fn generate_variant(
    generator: &dyn GenerationCapability,
    strategy: VariantStrategy,
    spec: &SectionSpec,
    evidence: &[EvidenceItem],
    weights: &QualityWeights,
) -> Result<DualVariantResult, InputError> {
    let ranked = prepare(spec, evidence)?;
    let text = generate_content(generator, variant_request(strategy, spec, &ranked)).await;

    let mut result = DualVariantResult {
        ideal: None,
        personalized: None,
        comparison: None,
        failures: Vec::new(),
    };
    let variant = score_variant(strategy, text, spec, &ranked, weights, &mut result.failures)?;
    *result.slot(strategy) = variant;
    Ok(result)
}

/// Fills in `comparison` when both variants are present and it is missing.
pub fn arbitrate_variants(
    result: &mut DualVariantResult,
    spec: &SectionSpec,
    evidence: &[EvidenceItem],
    thresholds: &ArbitrationThresholds,
) {
    if result.comparison.is_some() {
        return;
    }
    let (Some(ideal), Some(personalized)) = (&result.ideal, &result.personalized) else {
        return;
    };

    let strength = evidence_strength(evidence, &spec.requirements, &spec.job_description);
    let comparison = arbitrate(
        ideal.quality.overall,
        personalized.quality.overall,
        evidence.len(),
        strength,
        thresholds,
    );
    info!(
        "Section '{}': ideal={} personalized={} strength={} → {:?}",
        spec.section,
        ideal.quality.overall,
        personalized.quality.overall,
        strength,
        comparison.recommendation
    );
    result.comparison = Some(comparison);
}

/// Checks the section inputs and ranks the evidence the personalized prompt gets.
fn prepare(
    spec: &SectionSpec,
    evidence: &[EvidenceItem],
) -> Result<Vec<EvidenceItem>, InputError> {
    if spec.section.trim().is_empty() {
        return Err(InputError::EmptyField { field: "section" });
    }
    check_requirements(&spec.requirements)?;

    let ranking_target = ranking_target(spec);
    Ok(rank_evidence(&ranking_target, evidence)?
        .items
        .into_iter()
        .map(|r| r.item)
        .collect())
}

fn variant_request(
    strategy: VariantStrategy,
    spec: &SectionSpec,
    ranked: &[EvidenceItem],
) -> GenerationRequest {
    let (prompt, temperature) = match strategy {
        VariantStrategy::Ideal => (build_ideal_prompt(spec), IDEAL_TEMPERATURE),
        VariantStrategy::Personalized => (
            build_personalized_prompt(spec, ranked),
            PERSONALIZED_TEMPERATURE,
        ),
    };
    GenerationRequest::new(prompt, temperature, VARIANT_MAX_OUTPUT_TOKENS)
        .with_system(VARIANT_SYSTEM)
}

fn score_variant(
    strategy: VariantStrategy,
    text: Result<String, LlmError>,
    spec: &SectionSpec,
    ranked: &[EvidenceItem],
    weights: &QualityWeights,
    failures: &mut Vec<VariantFailure>,
) -> Result<Option<SectionVariant>, InputError> {
    let content = match text {
        Ok(content) => content,
        Err(e) => {
            warn!("{strategy:?} variant for '{}' failed: {e}", spec.section);
            failures.push(VariantFailure {
                strategy,
                failure: StepFailure::generation(&e),
            });
            return Ok(None);
        }
    };

    let evidence_items_used = match strategy {
        VariantStrategy::Ideal => Vec::new(),
        VariantStrategy::Personalized => items_used_in(&content, ranked),
    };
    Ok(Some(SectionVariant {
        strategy,
        quality: score_section(&content, &spec.ats_keywords, &spec.requirements, weights)?,
        content,
        evidence_items_used,
    }))
}

async fn generate_content(
    generator: &dyn GenerationCapability,
    request: GenerationRequest,
) -> Result<String, LlmError> {
    let response = generator.generate(request).await?;
    let content = response.text.trim();
    if content.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    Ok(content.to_string())
}

fn ranking_target(spec: &SectionSpec) -> String {
    let mut target = spec.job_description.clone();
    for requirement in &spec.requirements {
        target.push('\n');
        target.push_str(&requirement.text);
    }
    target
}

fn items_used_in(content: &str, items: &[EvidenceItem]) -> Vec<EvidenceItem> {
    items
        .iter()
        .filter(|item| {
            item.keywords.iter().any(|kw| contains_ci(content, kw))
                || term_overlap(&item.text, content) >= EVIDENCE_USE_OVERLAP
        })
        .cloned()
        .collect()
}

fn build_ideal_prompt(spec: &SectionSpec) -> String {
    fill_common(IDEAL_PROMPT_TEMPLATE, spec)
}

fn build_personalized_prompt(spec: &SectionSpec, evidence: &[EvidenceItem]) -> String {
    let evidence_json = serde_json::to_string_pretty(
        &evidence
            .iter()
            .map(|item| {
                serde_json::json!({
                    "id": item.id,
                    "text": item.text,
                    "category": item.category,
                    "keywords": item.keywords,
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());

    fill_common(PERSONALIZED_PROMPT_TEMPLATE, spec)
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{evidence_json}", &evidence_json)
}

fn fill_common(template: &str, spec: &SectionSpec) -> String {
    let requirements = spec
        .requirements
        .iter()
        .map(|r| format!("- {} ({:?})", r.text, r.priority))
        .collect::<Vec<_>>()
        .join("\n");
    let keywords = spec
        .ats_keywords
        .critical
        .iter()
        .chain(&spec.ats_keywords.important)
        .chain(&spec.ats_keywords.nice_to_have)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    template
        .replace("{section}", &spec.section)
        .replace("{job_title}", spec.job_title.as_deref().unwrap_or("(not specified)"))
        .replace("{job_description}", &spec.job_description)
        .replace("{requirements}", &requirements)
        .replace("{keywords}", &keywords)
        .replace("{instructions}", spec.instructions.as_deref().unwrap_or(""))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::llm_client::testing::{QueuedGenerator, ScriptedGenerator};
    use crate::models::evidence::fixtures::{item, requirement};
    use crate::models::RequirementPriority;
    use crate::variants::arbitration::Recommendation;

    fn is_personalized(request: &GenerationRequest) -> bool {
        request.prompt.contains("CANDIDATE EVIDENCE")
    }

    fn spec() -> SectionSpec {
        SectionSpec {
            section: "experience".to_string(),
            job_title: Some("Backend Engineer".to_string()),
            job_description: "Build Python services on AWS".to_string(),
            requirements: vec![requirement("Python services", RequirementPriority::Required)],
            ats_keywords: AtsKeywords {
                critical: vec!["Python".to_string(), "AWS".to_string()],
                ..Default::default()
            },
            instructions: None,
        }
    }

    fn split_generator(ideal: &'static str, personalized: &'static str) -> ScriptedGenerator {
        ScriptedGenerator::new(move |req| {
            if is_personalized(req) {
                Ok(personalized.to_string())
            } else {
                Ok(ideal.to_string())
            }
        })
    }

    #[tokio::test]
    async fn test_no_evidence_recommends_ideal() {
        let generator = split_generator("Led Python services on AWS", "Worked on services");
        let result = generate_dual_variants(
            &generator,
            &spec(),
            &[],
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();

        let comparison = result.comparison.unwrap();
        assert_eq!(comparison.recommendation, Recommendation::Ideal);
        assert_eq!(comparison.evidence_strength, 0);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_strong_evidence_and_better_score_recommends_personalized() {
        let generator = split_generator(
            "Worked on things",
            "Led Python services on AWS, cutting spend 30%",
        );
        let evidence = vec![item("e1", "Built Python services on AWS", &["python", "aws"])];

        let result = generate_dual_variants(
            &generator,
            &spec(),
            &evidence,
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();

        let personalized = result.personalized.as_ref().unwrap();
        assert_eq!(personalized.quality.overall, 88);
        assert_eq!(personalized.evidence_items_used.len(), 1);
        assert_eq!(result.ideal.as_ref().unwrap().quality.overall, 14);

        let comparison = result.comparison.unwrap();
        assert_eq!(comparison.evidence_strength, 100);
        assert_eq!(comparison.score_difference, 74);
        assert_eq!(comparison.recommendation, Recommendation::Personalized);
    }

    #[tokio::test]
    async fn test_one_failed_variant_keeps_the_other() {
        let generator = ScriptedGenerator::new(|req| {
            if is_personalized(req) {
                Err(503)
            } else {
                Ok("Led Python services".to_string())
            }
        });

        let result = generate_dual_variants(
            &generator,
            &spec(),
            &[item("e1", "Python", &["python"])],
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();

        assert!(result.ideal.is_some());
        assert!(result.personalized.is_none());
        assert!(result.comparison.is_none());
        assert!(!result.is_complete());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy, VariantStrategy::Personalized);
        assert_eq!(result.failures[0].failure.error_kind, ErrorKind::GenerationFailure);
        assert!(!result.failures[0].failure.success);
    }

    #[tokio::test]
    async fn test_both_failed_variants_are_reported() {
        let generator = ScriptedGenerator::failing(500);
        let result = generate_dual_variants(
            &generator,
            &spec(),
            &[],
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();

        assert!(result.ideal.is_none() && result.personalized.is_none());
        assert_eq!(result.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_output_is_a_generation_failure() {
        let generator = split_generator("Led Python services", "   ");
        let result = generate_dual_variants(
            &generator,
            &spec(),
            &[],
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();
        assert!(result.personalized.is_none());
        assert_eq!(result.failures[0].strategy, VariantStrategy::Personalized);
    }

    #[tokio::test]
    async fn test_only_personalized_prompt_carries_evidence() {
        let generator = split_generator("a", "b");
        let evidence = vec![item("e1", "Migrated billing to Kafka", &["kafka"])];
        generate_dual_variants(
            &generator,
            &spec(),
            &evidence,
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap();

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let ideal = requests.iter().find(|r| !is_personalized(r)).unwrap();
        let personalized = requests.iter().find(|r| is_personalized(r)).unwrap();
        assert!(!ideal.prompt.contains("Migrated billing to Kafka"));
        assert!(personalized.prompt.contains("Migrated billing to Kafka"));
        assert_eq!(ideal.temperature, IDEAL_TEMPERATURE);
        assert_eq!(personalized.temperature, PERSONALIZED_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_blank_section_is_input_error() {
        let generator = ScriptedGenerator::always("x");
        let mut bad = spec();
        bad.section = " ".to_string();
        let err = generate_dual_variants(
            &generator,
            &bad,
            &[],
            &QualityWeights::default(),
            &ArbitrationThresholds::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, InputError::EmptyField { field: "section" });
        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_strategy_retry_makes_one_call() {
        let generator = QueuedGenerator::new(vec![Ok("Led Python services on AWS".to_string())]);
        let result = generate_variant(
            &generator,
            VariantStrategy::Personalized,
            &spec(),
            &[item("e1", "Built Python services on AWS", &["python", "aws"])],
            &QualityWeights::default(),
        )
        .await
        .unwrap();

        assert_eq!(generator.remaining(), 0);
        assert!(result.ideal.is_none());
        assert_eq!(result.personalized.unwrap().evidence_items_used.len(), 1);
        assert!(result.comparison.is_none());
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_retrying_the_failed_strategy_completes_the_set() {
        let evidence = vec![item("e1", "Built Python services on AWS", &["python", "aws"])];
        // ideal succeeds and personalized fails, then the personalized retry succeeds
        let generator = QueuedGenerator::new(vec![
            Ok("Worked on things".to_string()),
            Err(503),
            Ok("Led Python services on AWS, cutting spend 30%".to_string()),
        ]);
        let first = generate_variant(
            &generator,
            VariantStrategy::Ideal,
            &spec(),
            &evidence,
            &QualityWeights::default(),
        )
        .await
        .unwrap();
        let failed = generate_variant(
            &generator,
            VariantStrategy::Personalized,
            &spec(),
            &evidence,
            &QualityWeights::default(),
        )
        .await
        .unwrap();
        assert_eq!(failed.failures[0].failure.error_kind, ErrorKind::GenerationFailure);

        let mut stored = first;
        stored.merge(failed);
        assert!(stored.ideal.is_some() && stored.personalized.is_none());
        assert_eq!(stored.failures.len(), 1);

        let retry = generate_variant(
            &generator,
            VariantStrategy::Personalized,
            &spec(),
            &evidence,
            &QualityWeights::default(),
        )
        .await
        .unwrap();
        stored.merge(retry);
        arbitrate_variants(&mut stored, &spec(), &evidence, &ArbitrationThresholds::default());

        assert_eq!(stored.ideal.as_ref().unwrap().content, "Worked on things");
        assert!(stored.failures.is_empty());
        let comparison = stored.comparison.unwrap();
        assert_eq!(comparison.score_difference, 74);
        assert_eq!(comparison.recommendation, Recommendation::Personalized);
    }

    #[test]
    fn test_merge_keeps_the_variant_missing_from_the_newer_result() {
        let old = SectionVariant {
            strategy: VariantStrategy::Personalized,
            content: "old personalized".to_string(),
            quality: QualityScore {
                overall: 60,
                ats_match_percentage: 60,
                requirements_coverage: 60,
                competitive_strength: 3,
                keywords_matched: Vec::new(),
                requirements_addressed: Vec::new(),
            },
            evidence_items_used: Vec::new(),
        };
        let mut stored = DualVariantResult {
            ideal: None,
            personalized: Some(old.clone()),
            comparison: None,
            failures: Vec::new(),
        };
        let newer = DualVariantResult {
            ideal: None,
            personalized: None,
            comparison: None,
            failures: vec![VariantFailure {
                strategy: VariantStrategy::Personalized,
                failure: StepFailure::generation(&LlmError::EmptyContent),
            }],
        };

        stored.merge(newer);
        assert_eq!(stored.personalized, Some(old));
        assert_eq!(stored.failures.len(), 1);
    }
}
