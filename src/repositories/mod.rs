pub mod account_repository;
pub mod ledger_repository;
pub mod payment_repository;

pub use account_repository::AccountRepository;
pub use ledger_repository::LedgerRepository;
pub use payment_repository::{is_unique_violation, PaymentRepository};
