//! Axum route handlers for evidence ranking and the evidence matrix.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::evidence::matrix::{build_evidence_matrix, AllocationPolicy, EvidenceMatrix};
use crate::evidence::ranker::{rank_evidence, top_ranked, RankedItem, RankingContext};
use crate::evidence::repository::resolve_evidence;
use crate::models::{EvidenceItem, Requirement};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    pub target_text: String,
    pub items: Option<Vec<EvidenceItem>>,
    pub owner_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResponse {
    pub context: RankingContext,
    pub items: Vec<RankedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRequest {
    pub requirements: Vec<Requirement>,
    pub items: Option<Vec<EvidenceItem>>,
    pub owner_id: Option<String>,
    pub allocation: Option<AllocationPolicy>,
}

/// POST /api/v1/evidence/rank
pub async fn handle_rank(
    State(state): State<AppState>,
    Json(request): Json<RankRequest>,
) -> Result<Json<RankResponse>, AppError> {
    let items = resolve_evidence(
        state.store.as_ref(),
        request.items,
        request.owner_id.as_deref(),
    )
    .await?;

    let outcome = rank_evidence(&request.target_text, &items)?;
    let items = match request.limit {
        Some(limit) => top_ranked(&outcome, limit),
        None => outcome.items,
    };

    Ok(Json(RankResponse {
        context: outcome.context,
        items,
    }))
}

/// POST /api/v1/evidence/matrix
pub async fn handle_matrix(
    State(state): State<AppState>,
    Json(request): Json<MatrixRequest>,
) -> Result<Json<EvidenceMatrix>, AppError> {
    let items = resolve_evidence(
        state.store.as_ref(),
        request.items,
        request.owner_id.as_deref(),
    )
    .await?;

    let policy = request
        .allocation
        .unwrap_or(state.config.pipeline.allocation);
    let matrix = build_evidence_matrix(&request.requirements, &items, policy)?;

    Ok(Json(matrix))
}
