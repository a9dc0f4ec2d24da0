use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::requests::FieldError;
use crate::error::AppError;
use crate::models::{
    AccountType, Currency, Direction, LedgerEntry, Payment, PaymentStatus, TransactionWithEntries,
};
use crate::services::{AccountBalance, PaymentPage};

/// Wire amounts are plain integers in minor units, within the safe
/// integer range.
fn minor_units(amount: Decimal) -> i64 {
    amount.to_i64().unwrap_or(i64::MAX)
}

/// The payment resource envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: String,
    pub object: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: Currency,
    pub authorized_amount: i64,
    pub captured_amount: i64,
    pub refunded_amount: i64,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            object: "payment".to_string(),
            status: payment.status,
            amount: minor_units(payment.amount),
            currency: payment.currency,
            authorized_amount: minor_units(payment.authorized_amount),
            captured_amount: minor_units(payment.captured_amount),
            refunded_amount: minor_units(payment.refunded_amount),
            description: payment.description,
            metadata: payment.metadata,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            expires_at: payment.expires_at,
        }
    }
}

/// The list envelope used by every collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub object: String,
    pub data: Vec<T>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl From<PaymentPage> for ListResponse<PaymentResponse> {
    fn from(page: PaymentPage) -> Self {
        Self {
            object: "list".to_string(),
            data: page.data.into_iter().map(PaymentResponse::from).collect(),
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryResponse {
    pub id: String,
    pub object: String,
    pub transaction_id: String,
    pub account_id: String,
    pub direction: Direction,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            object: "ledger_entry".to_string(),
            transaction_id: entry.transaction_id,
            account_id: entry.account_id,
            direction: entry.direction,
            amount: minor_units(entry.amount),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransactionResponse {
    pub id: String,
    pub object: String,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<LedgerEntryResponse>,
}

impl From<TransactionWithEntries> for LedgerTransactionResponse {
    fn from(bundle: TransactionWithEntries) -> Self {
        Self {
            id: bundle.transaction.id,
            object: "ledger_transaction".to_string(),
            description: bundle.transaction.description,
            reference_type: bundle.transaction.reference_type,
            reference_id: bundle.transaction.reference_id,
            created_at: bundle.transaction.created_at,
            entries: bundle
                .entries
                .into_iter()
                .map(LedgerEntryResponse::from)
                .collect(),
        }
    }
}

/// An account balance wrapped with the account metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub object: String,
    pub account_id: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub currency: Currency,
    pub balance: i64,
}

impl From<AccountBalance> for BalanceResponse {
    fn from(balance: AccountBalance) -> Self {
        Self {
            object: "balance".to_string(),
            account_id: balance.account.id,
            account_name: balance.account.name,
            account_type: balance.account.account_type,
            currency: balance.account.currency,
            balance: minor_units(balance.balance),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: bool,
}

/// The error envelope: `{"error": {"type", "message", "details?"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error wrapper translating engine failures into HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    Fields(Vec<FieldError>),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Fields(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: ErrorDetail {
                        kind: "validation_error".to_string(),
                        message: "request validation failed".to_string(),
                        details: Some(json!({ "fields": fields })),
                    },
                },
            ),
            ApiError::App(err) => {
                let (status, details) = match &err {
                    AppError::Validation(_) => (StatusCode::BAD_REQUEST, None),
                    AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
                    AppError::InvalidStateTransition {
                        current,
                        attempted,
                        allowed,
                    } => (
                        StatusCode::CONFLICT,
                        Some(json!({
                            "current_status": current,
                            "attempted_action": attempted,
                            "allowed_actions": allowed,
                        })),
                    ),
                    AppError::IdempotencyConflict(_) => (StatusCode::CONFLICT, None),
                    AppError::InvalidAmount {
                        requested, limit, ..
                    } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Some(json!({
                            "requested_amount": requested.map(minor_units),
                            "maximum_amount": limit.map(minor_units),
                        })),
                    ),
                    AppError::Database(_) | AppError::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, None)
                    }
                };

                // Internal failures are logged in full but surface as a
                // generic message, never the underlying error.
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "request failed with internal error");
                    "an internal error occurred".to_string()
                } else {
                    err.to_string()
                };

                (
                    status,
                    ErrorBody {
                        error: ErrorDetail {
                            kind: err.kind().to_string(),
                            message,
                            details,
                        },
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
