use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::store::{record_id, RecordStore, StoreError};

/// Postgres-backed record store. All logical tables share one JSONB table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                table_name TEXT NOT NULL,
                record_id  TEXT NOT NULL,
                data       JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (table_name, record_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Record store schema ready");
        Ok(())
    }
}

/// Pool exhaustion and closure mean the database is unreachable, not that the query failed.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, table: &str, filter: &Value) -> Result<Vec<Value>, StoreError> {
        let rows: Vec<Value> = sqlx::query_scalar(
            r#"
            SELECT data
            FROM records
            WHERE table_name = $1 AND data @> $2
            ORDER BY record_id
            "#,
        )
        .bind(table)
        .bind(filter)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        debug!("Fetched {} records from {table}", rows.len());
        Ok(rows)
    }

    async fn upsert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        let id = record_id(&record)?.to_string();

        let stored: Value = sqlx::query_scalar(
            r#"
            INSERT INTO records (table_name, record_id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (table_name, record_id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            RETURNING data
            "#,
        )
        .bind(table)
        .bind(&id)
        .bind(&record)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(stored)
    }

    async fn update(&self, table: &str, filter: &Value, patch: &Value) -> Result<(), StoreError> {
        if !patch.is_object() {
            return Err(StoreError::NotAnObject);
        }

        let result = sqlx::query(
            r#"
            UPDATE records
            SET data = data || $3, updated_at = now()
            WHERE table_name = $1 AND data @> $2
            "#,
        )
        .bind(table)
        .bind(filter)
        .bind(patch)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        debug!("Patched {} records in {table}", result.rows_affected());
        Ok(())
    }
}
