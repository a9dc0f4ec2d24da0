use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};
use crate::models::Account;

/// Repository for account rows. Accounts are seeded at init and never
/// mutated, so only reads live here.
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, type, currency, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Returns the subset of `ids` that does not exist, using a single
    /// query over the distinct IDs.
    pub async fn missing_ids(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[String],
    ) -> Result<Vec<String>> {
        let found: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM accounts WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        let found: std::collections::HashSet<String> =
            found.into_iter().map(|(id,)| id).collect();

        Ok(ids
            .iter()
            .filter(|id| !found.contains(*id))
            .cloned()
            .collect())
    }
}
