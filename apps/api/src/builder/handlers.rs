//! Axum route handlers for builder sessions.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::builder::manager::SessionView;
use crate::builder::session::{BuilderSession, SectionSelection, TargetInputs};
use crate::builder::step::BuilderStep;
use crate::errors::AppError;
use crate::evidence::matrix::{build_evidence_matrix, AllocationPolicy, EvidenceMatrix};
use crate::evidence::repository::resolve_evidence;
use crate::models::EvidenceItem;
use crate::state::AppState;
use crate::variants::{generate_dual_variants, generate_variant, DualVariantResult, VariantStrategy};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRequest {
    pub allocation: Option<AllocationPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub section: String,
    pub instructions: Option<String>,
    /// Regenerate only this strategy, keeping the other stored variant.
    pub strategy: Option<VariantStrategy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResponse {
    /// False when every requested variant failed and nothing was stored.
    pub stored: bool,
    /// The section's stored set after merging, or the failed result.
    #[serde(flatten)]
    pub result: DualVariantResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub selections: BTreeMap<String, SectionSelection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub session_id: Uuid,
    pub finalized_at: Option<DateTime<Utc>>,
    pub content: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateRequest {
    pub step: BuilderStep,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    pub version_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntrySummary {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step_completed: BuilderStep,
    pub is_current: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub current_id: Option<Uuid>,
    pub entries: Vec<HistoryEntrySummary>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(inputs): Json<TargetInputs>,
) -> Result<(StatusCode, Json<BuilderSession>), AppError> {
    let session = state.sessions.create(inputs).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.load(session_id).await?))
}

/// POST /api/v1/sessions/:id/assessment
pub async fn handle_assessment(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    body: Option<Json<AssessmentRequest>>,
) -> Result<Json<EvidenceMatrix>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.sessions.load(session_id).await?.session;
    session.check_can_complete(BuilderStep::Assessment)?;

    let evidence = session_evidence(&state, &session).await?;
    let policy = request
        .allocation
        .unwrap_or(state.config.pipeline.allocation);
    let matrix = build_evidence_matrix(&session.inputs.requirements, &evidence, policy)?;

    let stored = matrix.clone();
    state
        .sessions
        .mutate(session_id, move |s| {
            Ok(s.complete_assessment(stored, Utc::now())?)
        })
        .await?;

    info!(
        "Session {session_id} assessed: {} requirements, {} uncovered, coverage {:?}",
        matrix.rows.len(),
        matrix.uncovered().count(),
        matrix.coverage_percent
    );
    Ok(Json(matrix))
}

/// POST /api/v1/sessions/:id/build
///
/// Generates a section's variants from the evidence the assessment matched.
/// With `strategy` set only that variant is regenerated.
pub async fn handle_build(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildResponse>, AppError> {
    let session = state.sessions.load(session_id).await?.session;
    session.check_can_complete(BuilderStep::Build)?;

    let evidence = session.matched_evidence();
    let spec = session.section_spec(&request.section, request.instructions);
    let pipeline = &state.config.pipeline;
    let result = match request.strategy {
        Some(strategy) => {
            generate_variant(
                state.generator.as_ref(),
                strategy,
                &spec,
                &evidence,
                &pipeline.quality,
            )
            .await?
        }
        None => {
            generate_dual_variants(
                state.generator.as_ref(),
                &spec,
                &evidence,
                &pipeline.quality,
                &pipeline.arbitration,
            )
            .await?
        }
    };

    if !result.failures.is_empty() {
        warn!(
            "Section '{}' of {session_id} built with {} failed variant(s)",
            spec.section,
            result.failures.len()
        );
    }

    let thresholds = pipeline.arbitration.clone();
    let fresh = result.clone();
    let stored = state
        .sessions
        .mutate(session_id, move |s| {
            let stored = s.complete_build(&spec.section, fresh, &thresholds, Utc::now())?;
            Ok(if stored {
                s.variants.get(&spec.section).cloned()
            } else {
                None
            })
        })
        .await?;

    Ok(Json(match stored {
        Some(merged) => BuildResponse {
            stored: true,
            result: merged,
        },
        None => BuildResponse {
            stored: false,
            result,
        },
    }))
}

/// POST /api/v1/sessions/:id/review
pub async fn handle_review(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<BuilderSession>, AppError> {
    let session = state
        .sessions
        .mutate(session_id, move |s| {
            s.complete_review(request.selections, Utc::now())?;
            Ok(s.clone())
        })
        .await?;
    Ok(Json(session))
}

/// POST /api/v1/sessions/:id/finalize
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let response = state
        .sessions
        .mutate(session_id, |s| {
            s.finalize(Utc::now())?;
            Ok(FinalizeResponse {
                session_id: s.session_id,
                finalized_at: s.finalized_at,
                content: s.final_content(),
            })
        })
        .await?;
    state.sessions.save(session_id).await?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/:id/navigate
pub async fn handle_navigate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<BuilderSession>, AppError> {
    let session = state
        .sessions
        .mutate(session_id, |s| {
            s.navigate(request.step)?;
            Ok(s.clone())
        })
        .await?;
    Ok(Json(session))
}

/// POST /api/v1/sessions/:id/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BuilderSession>, AppError> {
    Ok(Json(state.sessions.save(session_id).await?))
}

/// GET /api/v1/sessions/:id/history
pub async fn handle_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state.sessions.load(session_id).await?.session.version_history;
    let current_id = history.current_id();
    let entries = history
        .entries()
        .map(|entry| HistoryEntrySummary {
            id: entry.id,
            timestamp: entry.timestamp,
            step_completed: entry.step_completed,
            is_current: Some(entry.id) == current_id,
        })
        .collect();
    Ok(Json(HistoryResponse {
        current_id,
        entries,
    }))
}

/// POST /api/v1/sessions/:id/revert
pub async fn handle_revert(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RevertRequest>,
) -> Result<Json<BuilderSession>, AppError> {
    let session = state
        .sessions
        .mutate(session_id, |s| {
            s.restore_version(request.version_id, Utc::now())?;
            Ok(s.clone())
        })
        .await?;
    Ok(Json(session))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Inline session evidence, or the owner's stored evidence when none was given.
async fn session_evidence(
    state: &AppState,
    session: &BuilderSession,
) -> Result<Vec<EvidenceItem>, AppError> {
    let inline = (!session.inputs.evidence.is_empty()).then(|| session.inputs.evidence.clone());
    resolve_evidence(
        state.store.as_ref(),
        inline,
        session.inputs.owner_id.as_deref(),
    )
    .await
}
