//! Axum route handler for dual-variant generation.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::evidence::repository::resolve_evidence;
use crate::models::EvidenceItem;
use crate::state::AppState;
use crate::variants::{
    arbitrate_variants, generate_dual_variants, generate_variant, DualVariantResult, SectionSpec,
    VariantStrategy,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantsRequest {
    #[serde(flatten)]
    pub spec: SectionSpec,
    pub items: Option<Vec<EvidenceItem>>,
    pub owner_id: Option<String>,
    /// Regenerate only this strategy.
    pub strategy: Option<VariantStrategy>,
    /// An earlier result to merge a single-strategy retry into.
    pub previous: Option<DualVariantResult>,
}

/// POST /api/v1/sections/variants
///
/// Always 200 once inputs are valid; failed variants are reported in
/// `failures`. With `strategy` set only that variant is regenerated and, when
/// `previous` is given, merged into it and re-arbitrated.
pub async fn handle_generate_variants(
    State(state): State<AppState>,
    Json(request): Json<VariantsRequest>,
) -> Result<Json<DualVariantResult>, AppError> {
    let evidence = resolve_evidence(
        state.store.as_ref(),
        request.items,
        request.owner_id.as_deref(),
    )
    .await?;

    let pipeline = &state.config.pipeline;
    let Some(strategy) = request.strategy else {
        let result = generate_dual_variants(
            state.generator.as_ref(),
            &request.spec,
            &evidence,
            &pipeline.quality,
            &pipeline.arbitration,
        )
        .await?;
        return Ok(Json(result));
    };

    let fresh = generate_variant(
        state.generator.as_ref(),
        strategy,
        &request.spec,
        &evidence,
        &pipeline.quality,
    )
    .await?;
    let result = match request.previous {
        Some(mut previous) => {
            previous.merge(fresh);
            arbitrate_variants(&mut previous, &request.spec, &evidence, &pipeline.arbitration);
            previous
        }
        None => fresh,
    };
    Ok(Json(result))
}
