//! Builder session: the only long-lived mutable state in the pipeline.
//!
//! Step handlers mutate one slice of the session each. Completing a step that
//! produces a materially new artifact appends a version history entry;
//! navigation, rewrites, and validations do not.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::builder::history::VersionHistory;
use crate::builder::step::{BuilderStep, TransitionError};
use crate::errors::InputError;
use crate::evidence::matrix::EvidenceMatrix;
use crate::models::{check_evidence, check_requirements, AtsKeywords, EvidenceItem, Requirement};
use crate::rewrite::rewriter::{ActionSource, RewriteResult};
use crate::rewrite::validator::ValidationResult;
use crate::variants::{
    arbitrate_variants, ArbitrationThresholds, DualVariantResult, Recommendation, SectionSpec,
    VariantStrategy,
};

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Everything the target step collects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    pub job_description: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub ats_keywords: AtsKeywords,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    /// Resume sections to build, e.g. "summary", "experience".
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl TargetInputs {
    pub fn check(&self) -> Result<(), InputError> {
        if self.job_description.trim().is_empty() {
            return Err(InputError::EmptyField {
                field: "jobDescription",
            });
        }
        check_requirements(&self.requirements)?;
        check_evidence(&self.evidence)
    }
}

/// The variant a user kept for a section during review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSelection {
    pub strategy: Recommendation,
    /// Final text. May be omitted for `ideal`/`personalized` to take the variant's content.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRewrite {
    pub text: String,
    pub version_number: u32,
    pub action_source: ActionSource,
}

/// The restorable slice of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub current_step: BuilderStep,
    pub inputs: TargetInputs,
    pub matrix: Option<EvidenceMatrix>,
    #[serde(default)]
    pub variants: BTreeMap<String, DualVariantResult>,
    #[serde(default)]
    pub selections: BTreeMap<String, SectionSelection>,
    #[serde(default)]
    pub rewrites: BTreeMap<String, SectionRewrite>,
    #[serde(default)]
    pub validation: BTreeMap<String, ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderSession {
    pub session_id: Uuid,
    pub current_step: BuilderStep,
    pub inputs: TargetInputs,
    pub matrix: Option<EvidenceMatrix>,
    #[serde(default)]
    pub variants: BTreeMap<String, DualVariantResult>,
    #[serde(default)]
    pub selections: BTreeMap<String, SectionSelection>,
    #[serde(default)]
    pub rewrites: BTreeMap<String, SectionRewrite>,
    #[serde(default)]
    pub validation: BTreeMap<String, ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Highest rewrite version handed out per section. Outlives restores so
    /// version numbers never repeat.
    #[serde(default)]
    pub rewrite_reservations: BTreeMap<String, u32>,
    #[serde(default)]
    pub version_history: VersionHistory,
    pub created_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

impl BuilderSession {
    /// An empty session at the target step with no history.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            current_step: BuilderStep::Target,
            inputs: TargetInputs::default(),
            matrix: None,
            variants: BTreeMap::new(),
            selections: BTreeMap::new(),
            rewrites: BTreeMap::new(),
            validation: BTreeMap::new(),
            finalized_at: None,
            rewrite_reservations: BTreeMap::new(),
            version_history: VersionHistory::new(),
            created_at: now,
            last_saved_at: now,
        }
    }

    /// Creates a session from target inputs. The first history entry is the
    /// origin baseline.
    pub fn start(inputs: TargetInputs, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let mut session = Self::new(now);
        session.complete_target(inputs, now)?;
        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_step: self.current_step,
            inputs: self.inputs.clone(),
            matrix: self.matrix.clone(),
            variants: self.variants.clone(),
            selections: self.selections.clone(),
            rewrites: self.rewrites.clone(),
            validation: self.validation.clone(),
            finalized_at: self.finalized_at,
        }
    }

    fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.current_step = snapshot.current_step;
        self.inputs = snapshot.inputs;
        self.matrix = snapshot.matrix;
        self.variants = snapshot.variants;
        self.selections = snapshot.selections;
        self.rewrites = snapshot.rewrites;
        self.validation = snapshot.validation;
        self.finalized_at = snapshot.finalized_at;
    }

    /// Whether `step`'s required input artifact is present.
    pub fn entry_requirement(&self, step: BuilderStep) -> Result<(), TransitionError> {
        let missing = match step {
            BuilderStep::Target => None,
            BuilderStep::Assessment if self.inputs.job_description.trim().is_empty() => {
                Some("target inputs have not been provided")
            }
            BuilderStep::Build if self.matrix.is_none() => {
                Some("no assessment result is present")
            }
            BuilderStep::Review if !self.has_any_variant() => Some("no section variants exist"),
            BuilderStep::Finalize if !self.has_any_variant() => Some("no section variants exist"),
            BuilderStep::Finalize if !self.unselected_sections().is_empty() => {
                Some("every built section needs a selection")
            }
            _ => None,
        };
        match missing {
            Some(missing) => Err(TransitionError::MissingArtifact { step, missing }),
            None => Ok(()),
        }
    }

    /// A step can be completed once it has been reached and its entry
    /// requirement holds.
    pub fn check_can_complete(&self, step: BuilderStep) -> Result<(), TransitionError> {
        if step > self.current_step {
            return Err(TransitionError::NotReached {
                step,
                current: self.current_step,
            });
        }
        self.entry_requirement(step)
    }

    /// Backward moves to any step are allowed; forward moves only to the next
    /// step, and only when its entry requirement is met.
    pub fn navigate(&mut self, step: BuilderStep) -> Result<(), TransitionError> {
        if step > self.current_step {
            if self.current_step.next() != Some(step) {
                return Err(TransitionError::SkipAhead {
                    from: self.current_step,
                    to: step,
                });
            }
            self.entry_requirement(step)?;
        }
        debug!(
            "Session {} navigated {} → {}",
            self.session_id, self.current_step, step
        );
        self.current_step = step;
        Ok(())
    }

    pub fn complete_target(
        &mut self,
        inputs: TargetInputs,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        inputs.check()?;
        self.inputs = inputs;
        self.advance_past(BuilderStep::Target);
        self.checkpoint(BuilderStep::Target, now);
        Ok(())
    }

    pub fn complete_assessment(
        &mut self,
        matrix: EvidenceMatrix,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check_can_complete(BuilderStep::Assessment)?;
        self.matrix = Some(matrix);
        self.advance_past(BuilderStep::Assessment);
        self.checkpoint(BuilderStep::Assessment, now);
        Ok(())
    }

    /// Merges a section's variant set into what is stored. A strategy that
    /// failed keeps its earlier variant, and a result where both failed is not
    /// stored at all. Returns whether anything was stored.
    pub fn complete_build(
        &mut self,
        section: &str,
        result: DualVariantResult,
        thresholds: &ArbitrationThresholds,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        self.check_can_complete(BuilderStep::Build)?;
        if section.trim().is_empty() {
            return Err(InputError::EmptyField { field: "section" }.into());
        }
        if result.ideal.is_none() && result.personalized.is_none() {
            return Ok(false);
        }

        let spec = self.section_spec(section, None);
        let evidence = self.matched_evidence();
        let mut merged = match self.variants.remove(section) {
            Some(mut stored) => {
                stored.merge(result);
                stored
            }
            None => result,
        };
        arbitrate_variants(&mut merged, &spec, &evidence, thresholds);
        self.variants.insert(section.to_string(), merged);

        self.advance_past(BuilderStep::Build);
        self.checkpoint(BuilderStep::Build, now);
        Ok(true)
    }

    pub fn complete_review(
        &mut self,
        selections: BTreeMap<String, SectionSelection>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check_can_complete(BuilderStep::Review)?;

        let mut resolved = Vec::with_capacity(selections.len());
        for (section, mut selection) in selections {
            let variants = self.variants.get(&section).ok_or_else(|| {
                TransitionError::InvalidSelection {
                    section: section.clone(),
                    reason: "the section has no variants",
                }
            })?;
            if selection.content.trim().is_empty() {
                let strategy = match selection.strategy {
                    Recommendation::Ideal => VariantStrategy::Ideal,
                    Recommendation::Personalized => VariantStrategy::Personalized,
                    Recommendation::Blend => {
                        return Err(TransitionError::InvalidSelection {
                            section,
                            reason: "a blend needs its combined content",
                        })
                    }
                };
                selection.content = variants
                    .variant(strategy)
                    .map(|v| v.content.clone())
                    .ok_or_else(|| TransitionError::InvalidSelection {
                        section: section.clone(),
                        reason: "the chosen variant failed to generate",
                    })?;
            }
            resolved.push((section, selection));
        }

        self.selections.extend(resolved);
        if self.entry_requirement(BuilderStep::Finalize).is_ok() {
            self.advance_past(BuilderStep::Review);
        }
        self.checkpoint(BuilderStep::Review, now);
        Ok(())
    }

    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check_can_complete(BuilderStep::Finalize)?;
        self.finalized_at = Some(now);
        self.checkpoint(BuilderStep::Finalize, now);
        info!("Session {} finalized", self.session_id);
        Ok(())
    }

    /// Hands out the next rewrite version for a section. Only the most
    /// recently reserved version may later be applied.
    pub fn reserve_rewrite_version(&mut self, section: &str) -> u32 {
        let stored = self.rewrites.get(section).map_or(0, |r| r.version_number);
        let reserved = self.rewrite_reservations.get(section).copied().unwrap_or(0);
        let version = stored.max(reserved) + 1;
        self.rewrite_reservations.insert(section.to_string(), version);
        version
    }

    /// Records a rewrite of a section. A rewrite whose version was superseded
    /// by a later reservation is ignored. Returns whether it was applied.
    pub fn apply_rewrite(
        &mut self,
        section: &str,
        result: &RewriteResult,
        action_source: ActionSource,
    ) -> bool {
        if self.rewrite_reservations.get(section) != Some(&result.version_number) {
            return false;
        }
        self.rewrites.insert(
            section.to_string(),
            SectionRewrite {
                text: result.text.clone(),
                version_number: result.version_number,
                action_source,
            },
        );
        if let Some(selection) = self.selections.get_mut(section) {
            selection.content = result.text.clone();
        }
        // Any stored verdict described the previous text.
        self.validation.remove(section);
        true
    }

    pub fn record_validation(&mut self, section: &str, result: ValidationResult) {
        self.validation.insert(section.to_string(), result);
    }

    /// Restores a history entry's snapshot and moves the history pointer to it.
    ///
    /// If the live state differs from the current entry it is recorded first,
    /// so re-selecting that checkpoint later restores it exactly.
    pub fn restore_version(
        &mut self,
        version_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let target = self
            .version_history
            .get(version_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or(TransitionError::UnknownVersion(version_id))?;

        // The checkpoint may evict at capacity; it must not take the target.
        self.record_checkpoint(self.current_step, now, Some(version_id));
        self.version_history
            .select(version_id)
            .ok_or(TransitionError::UnknownVersion(version_id))?;
        self.apply_snapshot(target);
        info!(
            "Session {} restored version {version_id} at step {}",
            self.session_id, self.current_step
        );
        Ok(())
    }

    /// Content per section for the finalized document: the selected content,
    /// which already reflects any later rewrite.
    pub fn final_content(&self) -> BTreeMap<String, String> {
        self.selections
            .iter()
            .map(|(section, selection)| (section.clone(), selection.content.clone()))
            .collect()
    }

    pub fn is_active(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_saved_at < ttl
    }

    /// The section description the build step generates from.
    pub fn section_spec(&self, section: &str, instructions: Option<String>) -> SectionSpec {
        SectionSpec {
            section: section.to_string(),
            job_title: self.inputs.job_title.clone(),
            job_description: self.inputs.job_description.clone(),
            requirements: self.inputs.requirements.clone(),
            ats_keywords: self.inputs.ats_keywords.clone(),
            instructions,
        }
    }

    /// Distinct evidence items the assessment selected, in row order.
    pub fn matched_evidence(&self) -> Vec<EvidenceItem> {
        let Some(matrix) = &self.matrix else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        matrix
            .rows
            .iter()
            .filter_map(|row| row.selected_evidence.clone())
            .filter(|item| seen.insert(item.id.clone()))
            .map(|mut item| {
                item.relevance_score = None;
                item
            })
            .collect()
    }

    fn has_any_variant(&self) -> bool {
        self.variants
            .values()
            .any(|r| r.ideal.is_some() || r.personalized.is_some())
    }

    fn unselected_sections(&self) -> Vec<&str> {
        self.variants
            .iter()
            .filter(|(_, r)| r.ideal.is_some() || r.personalized.is_some())
            .filter(|(section, _)| !self.selections.contains_key(*section))
            .map(|(section, _)| section.as_str())
            .collect()
    }

    fn advance_past(&mut self, step: BuilderStep) {
        self.current_step = step.next().unwrap_or(step);
    }

    fn checkpoint(&mut self, step: BuilderStep, now: DateTime<Utc>) {
        self.record_checkpoint(step, now, None);
    }

    fn record_checkpoint(&mut self, step: BuilderStep, now: DateTime<Utc>, pinned: Option<Uuid>) {
        let snapshot = self.snapshot();
        if let Some(id) = self.version_history.record(step, snapshot, now, pinned) {
            debug!(
                "Session {} recorded version {id} after {step} ({} entries)",
                self.session_id,
                self.version_history.len()
            );
        }
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::models::evidence::fixtures::{item, requirement};
    use crate::models::RequirementPriority;

    pub fn inputs(job_description: &str) -> TargetInputs {
        TargetInputs {
            job_title: Some("Backend Engineer".to_string()),
            job_description: job_description.to_string(),
            requirements: vec![requirement("Python services", RequirementPriority::Required)],
            ats_keywords: AtsKeywords {
                critical: vec!["Python".to_string()],
                ..Default::default()
            },
            evidence: vec![item("e1", "Built Python services", &["python"])],
            sections: vec!["experience".to_string()],
            owner_id: None,
        }
    }

    pub fn matrix() -> EvidenceMatrix {
        EvidenceMatrix {
            rows: Vec::new(),
            coverage_percent: None,
        }
    }

    pub fn variants(ideal: &str) -> DualVariantResult {
        use crate::quality::QualityScore;
        use crate::variants::SectionVariant;

        let quality = QualityScore {
            overall: 50,
            ats_match_percentage: 50,
            requirements_coverage: 50,
            competitive_strength: 3,
            keywords_matched: Vec::new(),
            requirements_addressed: Vec::new(),
        };
        DualVariantResult {
            ideal: Some(SectionVariant {
                strategy: VariantStrategy::Ideal,
                content: ideal.to_string(),
                quality: quality.clone(),
                evidence_items_used: Vec::new(),
            }),
            personalized: Some(SectionVariant {
                strategy: VariantStrategy::Personalized,
                content: format!("{ideal} (personalized)"),
                quality,
                evidence_items_used: Vec::new(),
            }),
            comparison: None,
            failures: Vec::new(),
        }
    }

    /// A session that has completed target, assessment, and build.
    pub fn built_session(now: DateTime<Utc>) -> BuilderSession {
        let mut session = BuilderSession::start(inputs("Build Python services"), now).unwrap();
        session.complete_assessment(matrix(), now).unwrap();
        session
            .complete_build(
                "experience",
                variants("Led Python services"),
                &ArbitrationThresholds::default(),
                now,
            )
            .unwrap();
        session
    }
}
