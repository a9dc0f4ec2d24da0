use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ids;

/// Direction of a ledger entry. The sign effect on a balance is
/// determined by the account's kind, not by the direction alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Debit => Direction::Credit,
            Direction::Credit => Direction::Debit,
        }
    }
}

/// One line of a ledger transaction. Amounts are always positive
/// integers in minor currency units; the direction carries the sign.
/// Entries are append-only: never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        transaction_id: impl Into<String>,
        account_id: impl Into<String>,
        direction: Direction,
        amount: Decimal,
    ) -> Self {
        Self {
            id: ids::entry_id(),
            transaction_id: transaction_id.into(),
            account_id: account_id.into(),
            direction,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Entry requested by a caller of `post_transaction`, before IDs and
/// timestamps are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInput {
    pub account_id: String,
    pub direction: Direction,
    pub amount: Decimal,
}

impl EntryInput {
    pub fn debit(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            direction: Direction::Debit,
            amount,
        }
    }

    pub fn credit(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            direction: Direction::Credit,
            amount,
        }
    }
}
