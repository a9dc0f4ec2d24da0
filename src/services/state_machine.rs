use crate::error::{AppError, Result};
use crate::models::PaymentStatus;

/// State machine governing payment status transitions. The transition
/// table is closed: any target not listed for a source is invalid, and
/// terminal statuses allow no transitions at all.
#[derive(Debug, Clone)]
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    /// Returns the statuses reachable from `current`.
    pub fn valid_transitions(current: PaymentStatus) -> &'static [PaymentStatus] {
        match current {
            PaymentStatus::Created => &[PaymentStatus::Authorized, PaymentStatus::Expired],
            PaymentStatus::Authorized => &[
                PaymentStatus::Captured,
                PaymentStatus::Voided,
                PaymentStatus::Expired,
            ],
            PaymentStatus::Captured => &[
                PaymentStatus::Settled,
                PaymentStatus::Refunded,
                PaymentStatus::PartiallyRefunded,
            ],
            PaymentStatus::Settled => {
                &[PaymentStatus::Refunded, PaymentStatus::PartiallyRefunded]
            }
            PaymentStatus::PartiallyRefunded => {
                &[PaymentStatus::Refunded, PaymentStatus::PartiallyRefunded]
            }
            PaymentStatus::Voided | PaymentStatus::Expired | PaymentStatus::Refunded => &[],
        }
    }

    /// Checks whether `from -> to` is allowed.
    pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    /// Validates a transition, returning the target on success. The
    /// error carries the current status, the attempted target, and the
    /// full allowed set.
    pub fn validate_transition(from: PaymentStatus, to: PaymentStatus) -> Result<PaymentStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::InvalidStateTransition {
                current: from,
                attempted: to.to_string(),
                allowed: Self::valid_transitions(from)
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
        }
    }
}
