use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Currency;
use crate::ids;

/// Status of a payment in its lifecycle. Transitions between statuses
/// are governed by the state machine; terminal statuses are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Settled,
    Voided,
    Expired,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// True when no further transitions are allowed from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Voided | PaymentStatus::Expired | PaymentStatus::Refunded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Settled => "settled",
            PaymentStatus::Voided => "voided",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "settled" => Ok(PaymentStatus::Settled),
            "voided" => Ok(PaymentStatus::Voided),
            "expired" => Ok(PaymentStatus::Expired),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// A payment and its money-movement counters. The payment does not own
/// its ledger transactions; the link is the reference pair
/// `("payment", id)` maintained by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub status: PaymentStatus,
    /// Amount of the original authorization request, in minor units.
    pub amount: Decimal,
    pub currency: Currency,
    pub authorized_amount: Decimal,
    pub captured_amount: Decimal,
    pub refunded_amount: Decimal,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set at authorization, cleared on every exit from `authorized`.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a payment in `authorized` status with a fresh hold.
    pub fn authorized(
        amount: Decimal,
        currency: Currency,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
        idempotency_key: String,
        expiry_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ids::payment_id(),
            status: PaymentStatus::Authorized,
            amount,
            currency,
            authorized_amount: amount,
            captured_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            description,
            metadata,
            idempotency_key: Some(idempotency_key),
            created_at: now,
            updated_at: now,
            expires_at: Some(now + Duration::days(expiry_days)),
        }
    }

    /// Captured amount not yet refunded.
    pub fn refundable_amount(&self) -> Decimal {
        self.captured_amount - self.refunded_amount
    }

    /// True when the authorization hold has lapsed.
    pub fn is_authorization_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Authorized
            && self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}
