use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Currency;
use crate::services::{AuthorizeParams, CaptureParams, RefundParams};

/// Field-level validation error reported by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Request to authorize a new payment. Amounts are integers in minor
/// currency units on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizePaymentRequest {
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuthorizePaymentRequest {
    pub fn into_params(self) -> Result<AuthorizeParams, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.amount < 1 {
            errors.push(FieldError::new("amount", "amount must be a positive integer"));
        }

        let currency = match self.currency.parse::<Currency>() {
            Ok(currency) => Some(currency),
            Err(err) => {
                errors.push(FieldError::new("currency", err.to_string()));
                None
            }
        };

        if let Some(metadata) = &self.metadata {
            match metadata.as_object() {
                None => errors.push(FieldError::new("metadata", "metadata must be an object")),
                Some(object) => {
                    if object.len() > 10 {
                        errors.push(FieldError::new("metadata", "metadata supports at most 10 keys"));
                    }
                    if object.values().any(|v| !v.is_string()) {
                        errors.push(FieldError::new("metadata", "metadata values must be strings"));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(AuthorizeParams {
            amount: Decimal::from(self.amount),
            currency: currency.unwrap_or(Currency::USD),
            description: self.description,
            metadata: self.metadata,
        })
    }
}

/// Request to capture an authorized payment. An omitted amount captures
/// the full authorized amount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturePaymentRequest {
    pub amount: Option<i64>,
}

impl CapturePaymentRequest {
    pub fn into_params(self) -> Result<CaptureParams, Vec<FieldError>> {
        if let Some(amount) = self.amount {
            if amount < 1 {
                return Err(vec![FieldError::new(
                    "amount",
                    "amount must be a positive integer",
                )]);
            }
        }
        Ok(CaptureParams {
            amount: self.amount.map(Decimal::from),
        })
    }
}

/// Request to refund a captured or settled payment. An omitted amount
/// refunds everything not yet refunded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundPaymentRequest {
    pub amount: Option<i64>,
}

impl RefundPaymentRequest {
    pub fn into_params(self) -> Result<RefundParams, Vec<FieldError>> {
        if let Some(amount) = self.amount {
            if amount < 1 {
                return Err(vec![FieldError::new(
                    "amount",
                    "amount must be a positive integer",
                )]);
            }
        }
        Ok(RefundParams {
            amount: self.amount.map(Decimal::from),
        })
    }
}

/// Query parameters for listing payments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPaymentsQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub status: Option<String>,
}
