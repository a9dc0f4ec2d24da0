use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

use crate::config::{AppEnv, DatabaseSettings};
use crate::error::{AppError, Result};

/// Embedded migrations: schema, CHECK constraints, immutability
/// triggers, indexes, and the system account seed.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connects the shared pool. Payment mutations take session-level row
/// locks, so connections must be direct: a transaction-mode proxy in
/// front of Postgres would break `FOR UPDATE` semantics.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(&settings.url)
        .map_err(AppError::Database)?
        .ssl_mode(if settings.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });

    let pool = PgPoolOptions::new()
        .max_connections(settings.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(AppError::Database)?;

    Ok(pool)
}

/// Truncates every mutable table. Seeded accounts survive; ledger rows
/// go through TRUNCATE, which the immutability triggers do not guard.
/// Refuses to run in production.
pub async fn reset(pool: &PgPool, env: AppEnv) -> Result<()> {
    if env == AppEnv::Production {
        return Err(AppError::validation(
            "refusing to reset the database in production",
        ));
    }

    sqlx::query("TRUNCATE ledger_entries, ledger_transactions, payments, idempotency_keys")
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

    Ok(())
}
