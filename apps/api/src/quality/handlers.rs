use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{AtsKeywords, Requirement};
use crate::quality::{score_section, QualityScore};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    pub text: String,
    #[serde(default)]
    pub ats_keywords: AtsKeywords,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// POST /api/v1/sections/score
pub async fn handle_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<QualityScore>, AppError> {
    let score = score_section(
        &request.text,
        &request.ats_keywords,
        &request.requirements,
        &state.config.pipeline.quality,
    )?;
    Ok(Json(score))
}
