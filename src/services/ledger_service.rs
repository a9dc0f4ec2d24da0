use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};
use crate::models::{
    Account, Direction, EntryInput, LedgerEntry, LedgerTransaction, TransactionWithEntries,
};
use crate::repositories::{AccountRepository, LedgerRepository};

/// Input for posting one balanced ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransactionInput {
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub entries: Vec<EntryInput>,
}

impl LedgerTransactionInput {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            reference_type: None,
            reference_id: None,
            entries: Vec::new(),
        }
    }

    pub fn with_reference(
        mut self,
        reference_type: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn debit(mut self, account_id: impl Into<String>, amount: Decimal) -> Self {
        self.entries.push(EntryInput::debit(account_id, amount));
        self
    }

    pub fn credit(mut self, account_id: impl Into<String>, amount: Decimal) -> Self {
        self.entries.push(EntryInput::credit(account_id, amount));
        self
    }
}

/// An account's derived balance together with the account metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub balance: Decimal,
}

/// The ledger engine. Posts balanced transactions, derives balances from
/// the entry log, and reads the audit trail. Balances are never stored;
/// the entry log is the single source of truth.
pub struct LedgerService {
    accounts: AccountRepository,
    ledger: LedgerRepository,
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    /// Posts a transaction in its own storage transaction. On any
    /// failure the storage transaction rolls back and nothing persists.
    pub async fn post_transaction(
        &self,
        input: LedgerTransactionInput,
    ) -> Result<TransactionWithEntries> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let posted = Self::post_transaction_in(&mut tx, input).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(posted)
    }

    /// Posts a transaction inside the caller's open storage transaction,
    /// so payment mutations compose the ledger write with their own row
    /// updates atomically.
    pub async fn post_transaction_in(
        tx: &mut Transaction<'_, Postgres>,
        input: LedgerTransactionInput,
    ) -> Result<TransactionWithEntries> {
        Self::validate_input(&input)?;

        let mut account_ids: Vec<String> =
            input.entries.iter().map(|e| e.account_id.clone()).collect();
        account_ids.sort();
        account_ids.dedup();

        let missing = AccountRepository::missing_ids(tx, &account_ids).await?;
        if let Some(id) = missing.first() {
            return Err(AppError::validation(format!("unknown account '{}'", id)));
        }

        let transaction = LedgerRepository::insert_transaction(
            tx,
            &LedgerTransaction::new(input.description, input.reference_type, input.reference_id),
        )
        .await?;

        let mut entries = Vec::with_capacity(input.entries.len());
        for entry in &input.entries {
            let row = LedgerRepository::insert_entry(
                tx,
                &LedgerEntry::new(
                    &transaction.id,
                    &entry.account_id,
                    entry.direction,
                    entry.amount,
                ),
            )
            .await?;
            entries.push(row);
        }

        metrics::counter!("ledger_transactions_posted_total").increment(1);

        Ok(TransactionWithEntries {
            transaction,
            entries,
        })
    }

    /// Validation order is cheapest first: entry count, balance, then
    /// account existence (which needs a query). The storage CHECK on
    /// `amount > 0` remains the final guard.
    fn validate_input(input: &LedgerTransactionInput) -> Result<()> {
        if input.entries.len() < 2 {
            return Err(AppError::validation(
                "a ledger transaction requires at least 2 entries",
            ));
        }

        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        for entry in &input.entries {
            if entry.amount <= Decimal::ZERO {
                return Err(AppError::validation(format!(
                    "entry amount must be positive, got {} for account '{}'",
                    entry.amount, entry.account_id
                )));
            }
            match entry.direction {
                Direction::Debit => debits += entry.amount,
                Direction::Credit => credits += entry.amount,
            }
        }

        if debits != credits {
            return Err(AppError::validation(format!(
                "unbalanced transaction: debits {} != credits {}",
                debits, credits
            )));
        }

        Ok(())
    }

    /// Derives the signed balance of an account from the entry log.
    /// Debit-normal kinds (asset, expense) compute debits − credits;
    /// credit-normal kinds (liability, revenue, equity) the reverse.
    /// Negative balances are meaningful and expected.
    pub async fn get_balance(&self, account_id: &str) -> Result<Decimal> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("account '{}' not found", account_id)))?;

        let (debits, credits) = self.ledger.direction_sums(account_id).await?;

        Ok(if account.account_type.is_debit_normal() {
            debits - credits
        } else {
            credits - debits
        })
    }

    /// Balance wrapped with the account metadata, for the API surface.
    pub async fn get_account_balance(&self, account_id: &str) -> Result<AccountBalance> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("account '{}' not found", account_id)))?;

        let (debits, credits) = self.ledger.direction_sums(account_id).await?;
        let balance = if account.account_type.is_debit_normal() {
            debits - credits
        } else {
            credits - debits
        };

        Ok(AccountBalance { account, balance })
    }

    /// Transactions referencing a business object, in commit order, each
    /// bundling its entries. An empty result is not an error.
    pub async fn get_transactions_by_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> Result<Vec<TransactionWithEntries>> {
        let transactions = self
            .ledger
            .find_by_reference(reference_type, reference_id)
            .await?;

        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = transactions.iter().map(|t| t.id.clone()).collect();
        let mut by_transaction: HashMap<String, Vec<LedgerEntry>> = HashMap::new();
        for entry in self.ledger.find_entries_for_transactions(&ids).await? {
            by_transaction
                .entry(entry.transaction_id.clone())
                .or_default()
                .push(entry);
        }

        Ok(transactions
            .into_iter()
            .map(|transaction| {
                let entries = by_transaction
                    .remove(&transaction.id)
                    .unwrap_or_default();
                TransactionWithEntries {
                    transaction,
                    entries,
                }
            })
            .collect())
    }

    /// System-wide `(sum of debits, sum of credits)`.
    pub async fn trial_balance(&self) -> Result<(Decimal, Decimal)> {
        self.ledger.trial_balance().await
    }
}
