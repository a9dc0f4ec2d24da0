pub mod account;
pub mod currency;
pub mod ledger_entry;
pub mod ledger_transaction;
pub mod payment;

pub use account::{system, Account, AccountType};
pub use currency::Currency;
pub use ledger_entry::{Direction, EntryInput, LedgerEntry};
pub use ledger_transaction::{LedgerTransaction, TransactionWithEntries};
pub use payment::{Payment, PaymentStatus};
