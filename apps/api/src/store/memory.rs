use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::store::{record_id, RecordStore, StoreError};

/// In-process record store. Filters match on top-level field equality.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    offline: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable` until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn record_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

fn matches_filter(record: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| record.get(key) == Some(expected)),
        None => false,
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, table: &str, filter: &Value) -> Result<Vec<Value>, StoreError> {
        self.check_online()?;
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|r| matches_filter(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        self.check_online()?;
        let id = record_id(&record)?.to_string();
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(table.to_string())
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, filter: &Value, patch: &Value) -> Result<(), StoreError> {
        self.check_online()?;
        let patch = patch.as_object().ok_or(StoreError::NotAnObject)?;
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rows) = tables.get_mut(table) {
            for record in rows.values_mut().filter(|r| matches_filter(r, filter)) {
                if let Some(fields) = record.as_object_mut() {
                    for (key, value) in patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = MemoryRecordStore::new();
        store
            .upsert("t", json!({"id": "a", "v": 1}))
            .await
            .unwrap();
        store
            .upsert("t", json!({"id": "a", "v": 2}))
            .await
            .unwrap();

        let rows = store.get("t", &json!({"id": "a"})).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["v"], 2);
        assert_eq!(store.record_count("t"), 1);
    }

    #[tokio::test]
    async fn test_get_filters_on_fields() {
        let store = MemoryRecordStore::new();
        store
            .upsert("t", json!({"id": "a", "ownerId": "u1"}))
            .await
            .unwrap();
        store
            .upsert("t", json!({"id": "b", "ownerId": "u2"}))
            .await
            .unwrap();

        let rows = store.get("t", &json!({"ownerId": "u2"})).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_update_merges_patch_shallowly() {
        let store = MemoryRecordStore::new();
        store
            .upsert("t", json!({"id": "a", "x": 1, "y": 1}))
            .await
            .unwrap();
        store
            .update("t", &json!({"id": "a"}), &json!({"y": 5}))
            .await
            .unwrap();

        let rows = store.get("t", &json!({"id": "a"})).await.unwrap();
        assert_eq!(rows[0]["x"], 1);
        assert_eq!(rows[0]["y"], 5);
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryRecordStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("t", &json!({})).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.upsert("t", json!({"id": "a"})).await.is_err());
    }
}
