use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::LedgerEntry;
use crate::ids;

/// A balanced set of ledger entries posted atomically. Transactions own
/// their entries, are linked to business objects through the reference
/// pair, and are never mutated or deleted once committed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
    pub id: String,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(
        description: impl Into<String>,
        reference_type: Option<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: ids::transaction_id(),
            description: description.into(),
            reference_type,
            reference_id,
            created_at: Utc::now(),
        }
    }
}

/// A transaction bundled with its entries, as returned by the ledger
/// read and post operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWithEntries {
    pub transaction: LedgerTransaction,
    pub entries: Vec<LedgerEntry>,
}
