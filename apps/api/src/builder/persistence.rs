use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::builder::session::BuilderSession;
use crate::store::{RecordStore, StoreError, SESSION_TABLE};

/// Saves and loads builder sessions through the record store.
/// Sessions are never deleted; expiry is decided by the reader.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn RecordStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, session: &BuilderSession) -> Result<(), StoreError> {
        let mut record = serde_json::to_value(session)?;
        let fields = record.as_object_mut().ok_or(StoreError::NotAnObject)?;
        fields.insert("id".to_string(), Value::String(session.session_id.to_string()));

        self.store.upsert(SESSION_TABLE, record).await?;
        debug!(
            "Saved session {} at step {}",
            session.session_id, session.current_step
        );
        Ok(())
    }

    /// Updates only `lastSavedAt` on a stored session.
    pub async fn touch(&self, session_id: Uuid, saved_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.store
            .update(
                SESSION_TABLE,
                &json!({ "id": session_id.to_string() }),
                &json!({ "lastSavedAt": saved_at }),
            )
            .await
    }

    pub async fn load(&self, session_id: Uuid) -> Result<Option<BuilderSession>, StoreError> {
        let mut records = self
            .store
            .get(SESSION_TABLE, &json!({ "id": session_id.to_string() }))
            .await?;
        match records.pop() {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }
}
