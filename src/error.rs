use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::PaymentStatus;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error taxonomy. Every engine failure maps onto exactly
/// one of these kinds; the API layer translates kinds to HTTP status
/// codes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input: unbalanced transaction, missing idempotency key,
    /// bad currency, oversized metadata.
    #[error("{0}")]
    Validation(String),

    /// Unknown payment or account.
    #[error("{0}")]
    NotFound(String),

    /// The state machine rejected the requested transition.
    #[error("cannot {attempted} a payment in status '{current}'")]
    InvalidStateTransition {
        current: PaymentStatus,
        attempted: String,
        allowed: Vec<String>,
    },

    /// An idempotency key was reused with different request parameters.
    #[error("{0}")]
    IdempotencyConflict(String),

    /// Amount exceeds what the payment can carry (capture > authorized,
    /// refund > remaining, non-positive amounts).
    #[error("{message}")]
    InvalidAmount {
        message: String,
        requested: Option<Decimal>,
        limit: Option<Decimal>,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable error kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidStateTransition { .. } => "invalid_state_transition",
            AppError::IdempotencyConflict(_) => "idempotency_conflict",
            AppError::InvalidAmount { .. } => "invalid_amount",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn invalid_amount(
        message: impl Into<String>,
        requested: Option<Decimal>,
        limit: Option<Decimal>,
    ) -> Self {
        AppError::InvalidAmount {
            message: message.into(),
            requested,
            limit,
        }
    }
}
