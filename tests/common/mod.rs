#![allow(dead_code)]

use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use payment_engine::config::AppEnv;
use payment_engine::db;
use payment_engine::models::{system, Direction, PaymentStatus};
use payment_engine::services::{AuthorizeParams, LedgerService, PaymentService, PAYMENT_REFERENCE};

/// Tests in one binary share the database; this lock serializes the
/// ones that assert on global balances.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn lock() -> MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// Connects to the test database, running migrations. Returns `None`
/// (and the whole test is skipped) when `DATABASE_URL` is not set.
pub async fn try_pool() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping: DATABASE_URL is not set");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    db::MIGRATOR
        .run(&pool)
        .await
        .expect("failed to run migrations");

    Some(pool)
}

pub async fn reset(pool: &PgPool) {
    db::reset(pool, AppEnv::Test)
        .await
        .expect("failed to reset test database");
}

/// Payment engine with the default 3% fee and 7-day authorization
/// expiry.
pub fn service(pool: PgPool) -> PaymentService {
    PaymentService::new(pool, 3, 7)
}

pub fn ledger(pool: PgPool) -> LedgerService {
    LedgerService::new(pool)
}

pub fn key() -> String {
    format!("key-{}", Uuid::new_v4())
}

pub fn authorize_params(amount: i64) -> AuthorizeParams {
    AuthorizeParams {
        amount: Decimal::from(amount),
        currency: payment_engine::models::Currency::USD,
        description: None,
        metadata: None,
    }
}

pub async fn balance(pool: &PgPool, account_id: &str) -> Decimal {
    ledger(pool.clone())
        .get_balance(account_id)
        .await
        .expect("failed to read balance")
}

/// Asserts the system-wide balance invariant: the sum of all debits
/// equals the sum of all credits.
pub async fn assert_god_check(pool: &PgPool) {
    let (debits, credits) = ledger(pool.clone())
        .trial_balance()
        .await
        .expect("failed to read trial balance");
    assert_eq!(debits, credits, "ledger debits and credits diverged");
}

pub async fn assert_all_accounts_zero(pool: &PgPool) {
    for account in system::ALL {
        assert_eq!(
            balance(pool, account).await,
            Decimal::ZERO,
            "account {} did not return to zero",
            account
        );
    }
}

/// Forces a payment's authorization to look lapsed. Payment rows are
/// mutable, so this does not fight the ledger triggers.
pub async fn force_expiry(pool: &PgPool, payment_id: &str) {
    sqlx::query("UPDATE payments SET expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(payment_id)
        .execute(pool)
        .await
        .expect("failed to backdate expiry");
}

/// A payment's financial amounts reconstructed from ledger entries
/// alone, without consulting the payment row.
#[derive(Debug, PartialEq, Eq)]
pub struct Witness {
    pub authorized: Decimal,
    pub captured: Decimal,
    pub refunded: Decimal,
    pub hold: Decimal,
}

pub async fn witness(pool: &PgPool, payment_id: &str) -> Witness {
    let transactions = ledger(pool.clone())
        .get_transactions_by_reference(PAYMENT_REFERENCE, payment_id)
        .await
        .expect("failed to read payment ledger");

    let mut authorized = Decimal::ZERO;
    let mut captured = Decimal::ZERO;
    let mut refunded = Decimal::ZERO;
    let mut hold = Decimal::ZERO;

    for bundle in &transactions {
        let is_settlement = bundle.entries.iter().any(|e| {
            e.account_id == system::PLATFORM_CASH && e.direction == Direction::Credit
        });

        for entry in &bundle.entries {
            match (entry.account_id.as_str(), entry.direction) {
                (system::CUSTOMER_HOLDS, Direction::Debit) => {
                    authorized += entry.amount;
                    hold += entry.amount;
                }
                (system::CUSTOMER_HOLDS, Direction::Credit) => hold -= entry.amount,
                (system::MERCHANT_PAYABLE, Direction::Credit) => captured += entry.amount,
                (system::PLATFORM_FEES, Direction::Credit) => captured += entry.amount,
                (system::MERCHANT_PAYABLE, Direction::Debit) if !is_settlement => {
                    refunded += entry.amount
                }
                (system::PLATFORM_FEES, Direction::Debit) if !is_settlement => {
                    refunded += entry.amount
                }
                _ => {}
            }
        }
    }

    Witness {
        authorized,
        captured,
        refunded,
        hold,
    }
}

/// Asserts that the payment row's counters match the ledger-derived
/// witness.
pub async fn assert_witness_matches(pool: &PgPool, payment_id: &str) {
    let payment = service(pool.clone())
        .get_payment(payment_id)
        .await
        .expect("failed to read payment");
    let witness = witness(pool, payment_id).await;

    assert_eq!(witness.authorized, payment.authorized_amount, "authorized");
    assert_eq!(witness.captured, payment.captured_amount, "captured");
    assert_eq!(witness.refunded, payment.refunded_amount, "refunded");

    let expected_hold = if payment.status == PaymentStatus::Authorized {
        payment.authorized_amount
    } else {
        Decimal::ZERO
    };
    assert_eq!(witness.hold, expected_hold, "hold");
}
