use serde_json::json;
use tracing::debug;

use crate::errors::AppError;
use crate::models::EvidenceItem;
use crate::store::{RecordStore, StoreError, EVIDENCE_TABLE};

/// Loads every evidence item owned by `owner_id`. Read-only: the pipeline never
/// writes evidence back.
pub async fn load_evidence(
    store: &dyn RecordStore,
    owner_id: &str,
) -> Result<Vec<EvidenceItem>, StoreError> {
    let records = store
        .get(EVIDENCE_TABLE, &json!({ "ownerId": owner_id }))
        .await?;

    let items = records
        .into_iter()
        .map(serde_json::from_value::<EvidenceItem>)
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Loaded {} evidence items for owner {owner_id}", items.len());
    Ok(items)
}

/// Inline evidence wins; otherwise evidence is loaded by owner; otherwise none.
pub async fn resolve_evidence(
    store: &dyn RecordStore,
    inline: Option<Vec<EvidenceItem>>,
    owner_id: Option<&str>,
) -> Result<Vec<EvidenceItem>, AppError> {
    match (inline, owner_id) {
        (Some(items), _) => Ok(items),
        (None, Some(owner)) => Ok(load_evidence(store, owner).await?),
        (None, None) => Ok(Vec::new()),
    }
}
