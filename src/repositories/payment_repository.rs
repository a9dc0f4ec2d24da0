use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};
use crate::models::{Payment, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, status, amount, currency, authorized_amount, captured_amount, \
     refunded_amount, description, metadata, idempotency_key, created_at, updated_at, expires_at";

/// Repository for payment rows. All writes run inside the caller's
/// storage transaction; the row lock taken by `lock_by_id` is the
/// serialization point for everything that follows it.
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> Result<Payment> {
        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, status, amount, currency, authorized_amount, captured_amount,
                                  refunded_amount, description, metadata, idempotency_key,
                                  created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(&payment.id)
        .bind(payment.status)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.authorized_amount)
        .bind(payment.captured_amount)
        .bind(payment.refunded_amount)
        .bind(&payment.description)
        .bind(&payment.metadata)
        .bind(&payment.idempotency_key)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.expires_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// `SELECT ... FOR UPDATE` on the payment row. Must be the first
    /// statement of every mutation's storage transaction.
    pub async fn lock_by_id(
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE id = $1
            FOR UPDATE
            "#,
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE idempotency_key = $1
            "#,
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Persists a state transition: status, money counters, expiry and
    /// the update timestamp. Identity fields never change.
    pub async fn update_state(
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
    ) -> Result<Payment> {
        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                captured_amount = $3,
                refunded_amount = $4,
                expires_at = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(&payment.id)
        .bind(payment.status)
        .bind(payment.captured_amount)
        .bind(payment.refunded_amount)
        .bind(payment.expires_at)
        .bind(payment.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Reverse-chronological page of payments. The sortable ID doubles
    /// as the cursor; `limit + 1` rows are fetched so the caller can
    /// detect whether more pages exist.
    pub async fn list(
        &self,
        limit: i64,
        cursor: Option<&str>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE ($1::text IS NULL OR id < $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        ))
        .bind(cursor)
        .bind(status.map(|s| s.as_str().to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

/// True when `err` is a Postgres unique violation on the named
/// constraint or index.
pub fn is_unique_violation(err: &AppError, constraint: &str) -> bool {
    if let AppError::Database(sqlx::Error::Database(db_err)) = err {
        return db_err.code().as_deref() == Some("23505")
            && db_err.constraint() == Some(constraint);
    }
    false
}
