//! Record store: opaque keyed CRUD over JSON records.
//!
//! The pipeline never assumes transactional multi-table writes; every call is an
//! independent write. Records are JSON objects carrying a string `id`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

/// Logical table holding evidence items, filtered by `ownerId`.
pub const EVIDENCE_TABLE: &str = "evidence_items";
/// Logical table holding serialized builder sessions keyed by `id`.
pub const SESSION_TABLE: &str = "builder_sessions";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record has no string 'id' field")]
    MissingId,

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record in `table` whose top-level fields contain `filter`.
    async fn get(&self, table: &str, filter: &Value) -> Result<Vec<Value>, StoreError>;

    /// Inserts or replaces the record keyed by its `id`, returning the stored record.
    async fn upsert(&self, table: &str, record: Value) -> Result<Value, StoreError>;

    /// Shallow-merges `patch` into every record matching `filter`.
    async fn update(&self, table: &str, filter: &Value, patch: &Value) -> Result<(), StoreError>;
}

/// Extracts the string `id` a record is keyed by.
pub fn record_id(record: &Value) -> Result<&str, StoreError> {
    if !record.is_object() {
        return Err(StoreError::NotAnObject);
    }
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingId)
}
