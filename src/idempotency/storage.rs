use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};

const FIND_LIVE_QUERY: &str = r#"
    SELECT key, resource_type, resource_id, request_hash, response_code, response_body,
           created_at, expires_at
    FROM idempotency_keys
    WHERE key = $1 AND expires_at > NOW()
"#;

/// A stored idempotency key with the response it produced. Records
/// expire 24 hours after creation and may be garbage-collected.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub resource_type: String,
    pub resource_id: String,
    /// SHA-256 over the endpoint's parameter projection, used to detect
    /// key reuse with different parameters.
    pub request_hash: String,
    pub response_code: i32,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        key: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        request_hash: impl Into<String>,
        response_code: i32,
        response_body: serde_json::Value,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            request_hash: request_hash.into(),
            response_code,
            response_body,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Postgres-backed store for idempotency records, sharing the payment
/// substrate.
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a record that has not yet expired.
    pub async fn find_live(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRecord>(FIND_LIVE_QUERY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// `find_live` on the caller's open storage transaction, for checks
    /// that run while a row lock is already held. Using the same
    /// connection avoids acquiring a second one from the pool mid-lock.
    pub async fn find_live_in(
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRecord>(FIND_LIVE_QUERY)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Inserts a record. On a concurrent duplicate the first write
    /// stands.
    pub async fn insert(&self, record: &IdempotencyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, resource_type, resource_id, request_hash,
                                          response_code, response_body, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&record.key)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(&record.request_hash)
        .bind(record.response_code)
        .bind(&record.response_body)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Deletes expired records. Returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_keys WHERE expires_at <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
