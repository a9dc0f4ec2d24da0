pub mod ledger_service;
pub mod payment_service;
pub mod state_machine;

pub use ledger_service::{AccountBalance, LedgerService, LedgerTransactionInput};
pub use payment_service::{
    AuthorizeParams, CaptureParams, ListParams, PaymentPage, PaymentService, RefundParams,
    PAYMENT_REFERENCE,
};
pub use state_machine::PaymentStateMachine;
