use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};
use crate::models::{LedgerEntry, LedgerTransaction};

/// Repository for the append-only ledger tables. There are no update or
/// delete operations by design; the storage triggers reject them anyway.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        transaction: &LedgerTransaction,
    ) -> Result<LedgerTransaction> {
        let row = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO ledger_transactions (id, description, reference_type, reference_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, description, reference_type, reference_id, created_at
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.description)
        .bind(&transaction.reference_type)
        .bind(&transaction.reference_id)
        .bind(transaction.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn insert_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<LedgerEntry> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (id, transaction_id, account_id, direction, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, transaction_id, account_id, direction, amount, created_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.transaction_id)
        .bind(&entry.account_id)
        .bind(entry.direction)
        .bind(entry.amount)
        .bind(entry.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Transactions with a matching reference pair, oldest first.
    pub async fn find_by_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> Result<Vec<LedgerTransaction>> {
        let rows = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT id, description, reference_type, reference_id, created_at
            FROM ledger_transactions
            WHERE reference_type = $1 AND reference_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Entries for a set of transactions, in creation order.
    pub async fn find_entries_for_transactions(
        &self,
        transaction_ids: &[String],
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, transaction_id, account_id, direction, amount, created_at
            FROM ledger_entries
            WHERE transaction_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(transaction_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Sum of debits and sum of credits posted to one account.
    pub async fn direction_sums(&self, account_id: &str) -> Result<(Decimal, Decimal)> {
        let row: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN direction = 'DEBIT' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN direction = 'CREDIT' THEN amount ELSE 0 END), 0)
            FROM ledger_entries
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Sum of all debits and all credits across the whole ledger. Equal
    /// sums are the system-wide balance invariant.
    pub async fn trial_balance(&self) -> Result<(Decimal, Decimal)> {
        let row: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN direction = 'DEBIT' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN direction = 'CREDIT' THEN amount ELSE 0 END), 0)
            FROM ledger_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
