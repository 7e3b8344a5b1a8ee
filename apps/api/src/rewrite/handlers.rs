//! Axum route handlers for section rewrites and rewrite validation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::GenerationCapability;
use crate::models::EvidenceClaim;
use crate::rewrite::rewriter::{rewrite_section, RewriteRequest, RewriteResult};
use crate::rewrite::tracker::ValidationTicket;
use crate::rewrite::validator::{validate_rewrite, ValidationPolicy, ValidationResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    #[serde(flatten)]
    pub result: RewriteResult,
    /// True when a background validation was started for this rewrite.
    pub validation_pending: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub original: String,
    pub rewritten: String,
    #[serde(default)]
    pub evidence_claims: Vec<EvidenceClaim>,
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatus {
    pub section: String,
    pub pending: bool,
    pub result: Option<ValidationResult>,
}

/// POST /api/v1/sections/rewrite
///
/// Session-bound AI rewrites are validated in the background; the latest
/// verdict is read from `/sessions/:id/validations/:section`.
pub async fn handle_rewrite(
    State(state): State<AppState>,
    Json(request): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>, AppError> {
    let section = request.section_name().to_string();

    let Some(session_id) = request.session_id else {
        let result = rewrite_section(state.generator.as_ref(), &request, 1).await?;
        return Ok(Json(RewriteResponse {
            result,
            validation_pending: false,
        }));
    };

    // Reserved before generating so overlapping rewrites of a section get
    // distinct versions and only the last one issued can land.
    let version = state
        .sessions
        .mutate(session_id, |s| Ok(s.reserve_rewrite_version(&section)))
        .await?;
    let result = rewrite_section(state.generator.as_ref(), &request, version).await?;

    let validations = state.validations.clone();
    let needs_validation = request.needs_validation();
    let ticket = state
        .sessions
        .mutate(session_id, |s| {
            if !s.apply_rewrite(&section, &result, request.action_source) {
                info!("Ignoring stale rewrite v{version} of {session_id}/{section}");
                return Ok(None);
            }
            if needs_validation {
                Ok(Some(validations.begin(session_id, &section)))
            } else {
                validations.cancel(session_id, &section);
                Ok(None)
            }
        })
        .await?;

    let validation_pending = ticket.is_some();
    if let Some(ticket) = ticket {
        spawn_validation(
            &state,
            ticket,
            request.section_text.clone(),
            result.text.clone(),
            request.evidence_claims.clone(),
        );
    }

    Ok(Json(RewriteResponse {
        result,
        validation_pending,
    }))
}

/// POST /api/v1/sections/validate
pub async fn handle_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResult>, AppError> {
    let result = validate_rewrite(
        state.generator.as_ref(),
        &request.original,
        &request.rewritten,
        &request.evidence_claims,
        request.section.as_deref().unwrap_or("section"),
        &state.config.pipeline.validation,
    )
    .await?;
    Ok(Json(result))
}

/// GET /api/v1/sessions/:id/validations/:section
pub async fn handle_validation_status(
    State(state): State<AppState>,
    Path((session_id, section)): Path<(Uuid, String)>,
) -> Result<Json<ValidationStatus>, AppError> {
    let session = state.sessions.load(session_id).await?.session;
    let pending = state.validations.is_pending(session_id, &section);
    let result = state
        .validations
        .latest(session_id, &section)
        .or_else(|| session.validation.get(&section).cloned());

    Ok(Json(ValidationStatus {
        section,
        pending,
        result,
    }))
}

fn spawn_validation(
    state: &AppState,
    ticket: ValidationTicket,
    original: String,
    rewritten: String,
    claims: Vec<EvidenceClaim>,
) {
    let generator: Arc<dyn GenerationCapability> = state.generator.clone();
    let sessions = state.sessions.clone();
    let validations = state.validations.clone();
    let policy: ValidationPolicy = state.config.pipeline.validation.clone();

    tokio::spawn(async move {
        let result = match validate_rewrite(
            generator.as_ref(),
            &original,
            &rewritten,
            &claims,
            &ticket.section,
            &policy,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Validation of {}/{} could not run: {e}",
                    ticket.session_id, ticket.section
                );
                ValidationResult::from_issues(Vec::new(), 0.0, true)
            }
        };

        let recorded = sessions
            .mutate(ticket.session_id, |s| {
                let applied = validations.complete(&ticket, result.clone());
                if applied {
                    s.record_validation(&ticket.section, result);
                }
                Ok(applied)
            })
            .await;
        if let Err(e) = recorded {
            warn!(
                "Could not record validation for {}/{}: {e}",
                ticket.session_id, ticket.section
            );
        }
    });
}
