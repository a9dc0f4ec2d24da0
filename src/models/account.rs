use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Currency;

/// Account kinds following double-entry bookkeeping principles. The set
/// is closed; balance computation selects the normal side by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Resources held. Debits increase the balance.
    Asset,
    /// Amounts owed. Credits increase the balance.
    Liability,
    /// Residual claim. Credits increase the balance.
    Equity,
    /// Income earned. Credits increase the balance.
    Revenue,
    /// Costs incurred. Debits increase the balance.
    Expense,
}

impl AccountType {
    /// True when debits increase the balance (asset, expense).
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

/// A ledger account. Accounts are created once at system init and are
/// immutable thereafter; balances are always derived from the entry log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub account_type: AccountType,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// The five system accounts seeded at init.
pub mod system {
    pub const CUSTOMER_FUNDS: &str = "customer_funds";
    pub const CUSTOMER_HOLDS: &str = "customer_holds";
    pub const MERCHANT_PAYABLE: &str = "merchant_payable";
    pub const PLATFORM_CASH: &str = "platform_cash";
    pub const PLATFORM_FEES: &str = "platform_fees";

    pub const ALL: [&str; 5] = [
        CUSTOMER_FUNDS,
        CUSTOMER_HOLDS,
        MERCHANT_PAYABLE,
        PLATFORM_CASH,
        PLATFORM_FEES,
    ];
}
