//! Section rewrites. AI-assisted rewrites go through the generation capability;
//! manual edits are recorded as-is with no generation call.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, InputError};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{generate_json, GenerationCapability, GenerationRequest, LlmError};
use crate::models::{check_claims, EvidenceClaim};
use crate::rewrite::prompts::REWRITE_PROMPT_TEMPLATE;

pub const REWRITE_TEMPERATURE: f32 = 0.5;
pub const REWRITE_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Who produced the rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// The user's own edit. Never validated.
    Manual,
    #[default]
    AiAssist,
    QuickAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    /// Current section text, or the edited text for a manual edit.
    pub section_text: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub evidence_claims: Vec<EvidenceClaim>,
    pub session_id: Option<Uuid>,
    pub section: Option<String>,
    #[serde(default)]
    pub action_source: ActionSource,
    #[serde(default)]
    pub skip_validation: bool,
}

impl RewriteRequest {
    pub fn section_name(&self) -> &str {
        self.section.as_deref().unwrap_or("section")
    }

    /// Validation runs for AI-produced rewrites unless the caller opts out.
    pub fn needs_validation(&self) -> bool {
        self.action_source != ActionSource::Manual && !self.skip_validation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResult {
    pub text: String,
    pub keywords_added: Vec<String>,
    pub evidence_used: Vec<String>,
    pub open_questions: Vec<String>,
    pub version_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteDraft {
    text: String,
    #[serde(default)]
    keywords_added: Vec<String>,
    #[serde(default)]
    evidence_used: Vec<String>,
    #[serde(default)]
    open_questions: Vec<String>,
}

pub async fn rewrite_section(
    generator: &dyn GenerationCapability,
    request: &RewriteRequest,
    version_number: u32,
) -> Result<RewriteResult, AppError> {
    if request.section_text.trim().is_empty() {
        return Err(InputError::EmptyField {
            field: "sectionText",
        }
        .into());
    }
    check_claims(&request.evidence_claims)?;

    if request.action_source == ActionSource::Manual {
        return Ok(RewriteResult {
            text: request.section_text.clone(),
            keywords_added: Vec::new(),
            evidence_used: Vec::new(),
            open_questions: Vec::new(),
            version_number,
        });
    }

    if request.instruction.trim().is_empty() {
        return Err(InputError::EmptyField {
            field: "instruction",
        }
        .into());
    }

    let llm_request = GenerationRequest::new(
        build_rewrite_prompt(request),
        REWRITE_TEMPERATURE,
        REWRITE_MAX_OUTPUT_TOKENS,
    )
    .with_system(JSON_ONLY_SYSTEM);
    let draft: RewriteDraft = generate_json(generator, llm_request).await?;

    let text = draft.text.trim().to_string();
    if text.is_empty() {
        return Err(LlmError::EmptyContent.into());
    }

    let known_ids: HashSet<&str> = request
        .evidence_claims
        .iter()
        .map(|c| c.evidence_id.as_str())
        .collect();
    let mut evidence_used = Vec::new();
    for id in draft.evidence_used {
        if !known_ids.contains(id.as_str()) {
            warn!("Rewrite cited unknown evidence id '{id}', dropping it");
        } else if !evidence_used.contains(&id) {
            evidence_used.push(id);
        }
    }

    let mut keywords_added: Vec<String> = Vec::new();
    for kw in draft.keywords_added {
        if !keywords_added.iter().any(|k| k.eq_ignore_ascii_case(&kw)) {
            keywords_added.push(kw);
        }
    }

    info!(
        "Rewrote '{}' (v{version_number}): {} keywords added, {} evidence items used",
        request.section_name(),
        keywords_added.len(),
        evidence_used.len()
    );

    Ok(RewriteResult {
        text,
        keywords_added,
        evidence_used,
        open_questions: draft.open_questions,
        version_number,
    })
}

fn build_rewrite_prompt(request: &RewriteRequest) -> String {
    let claims_json = serde_json::to_string_pretty(&request.evidence_claims)
        .unwrap_or_else(|_| "[]".to_string());

    REWRITE_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{section}", request.section_name())
        .replace("{instruction}", &request.instruction)
        .replace("{section_text}", &request.section_text)
        .replace("{claims_json}", &claims_json)
}
