use chrono::Duration;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};

use super::storage::{IdempotencyRecord, IdempotencyStore};
use crate::error::{AppError, Result};

/// How long a recorded key keeps replaying its response.
const KEY_TTL_HOURS: i64 = 24;

/// Outcome of checking a caller-supplied idempotency key.
#[derive(Debug)]
pub enum GateOutcome {
    /// No live record; the operation should run.
    Proceed,
    /// The key was seen before with the same parameters; return the
    /// stored response instead of re-running the operation.
    Replay(IdempotencyRecord),
}

/// The idempotency gate. Maps a caller key plus the endpoint's fixed
/// parameter projection onto a previously produced result, and rejects
/// reuse of a key with different parameters.
pub struct IdempotencyGate {
    store: IdempotencyStore,
}

impl IdempotencyGate {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: IdempotencyStore::new(pool),
        }
    }

    /// SHA-256 hex digest of an endpoint's parameter projection.
    pub fn hash_projection<T: Serialize>(projection: &T) -> String {
        let json = serde_json::to_string(projection).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Rejects empty keys. Split out so operations whose parameter
    /// projection is only known later (under the row lock) can still
    /// fail fast on a missing key.
    pub fn ensure_key(&self, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(AppError::validation(
                "an idempotency key is required for this operation",
            ));
        }
        Ok(())
    }

    pub async fn check(&self, key: &str, request_hash: &str) -> Result<GateOutcome> {
        self.ensure_key(key)?;
        Self::resolve(self.store.find_live(key).await?, key, request_hash)
    }

    /// `check` on the caller's open storage transaction. Used by
    /// operations whose parameter projection is only known once the
    /// payment row is locked.
    pub async fn check_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        request_hash: &str,
    ) -> Result<GateOutcome> {
        self.ensure_key(key)?;
        Self::resolve(IdempotencyStore::find_live_in(tx, key).await?, key, request_hash)
    }

    fn resolve(
        record: Option<IdempotencyRecord>,
        key: &str,
        request_hash: &str,
    ) -> Result<GateOutcome> {
        match record {
            Some(record) if record.request_hash != request_hash => {
                Err(AppError::IdempotencyConflict(format!(
                    "idempotency key '{}' was already used with different parameters",
                    key
                )))
            }
            Some(record) => Ok(GateOutcome::Replay(record)),
            None => Ok(GateOutcome::Proceed),
        }
    }

    /// Records the response produced under `key`. Runs after the
    /// operation's storage transaction commits; the authoritative
    /// resource row carries the key independently.
    pub async fn record<T: Serialize>(
        &self,
        key: &str,
        resource_type: &str,
        resource_id: &str,
        request_hash: &str,
        response_code: i32,
        response: &T,
    ) -> Result<()> {
        let body = serde_json::to_value(response)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serializing response: {}", e)))?;

        self.store
            .insert(&IdempotencyRecord::new(
                key,
                resource_type,
                resource_id,
                request_hash,
                response_code,
                body,
                Duration::hours(KEY_TTL_HOURS),
            ))
            .await
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }
}
