use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::idempotency::{GateOutcome, IdempotencyGate};
use crate::models::{
    system, Currency, Payment, PaymentStatus, TransactionWithEntries,
};
use crate::money;
use crate::repositories::{is_unique_violation, PaymentRepository};
use crate::services::ledger_service::{
    AccountBalance, LedgerService, LedgerTransactionInput,
};
use crate::services::state_machine::PaymentStateMachine;

/// Reference type linking ledger transactions to payments.
pub const PAYMENT_REFERENCE: &str = "payment";

const MAX_METADATA_KEYS: usize = 10;
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeParams {
    /// Amount in minor currency units; must be positive.
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    /// Flat string-to-string map, at most 10 keys.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureParams {
    /// Defaults to the full authorized amount.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    /// Defaults to the captured amount not yet refunded.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub status: Option<PaymentStatus>,
}

/// One page of payments in reverse-chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPage {
    pub data: Vec<Payment>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// The payment engine. Each mutation runs the same skeleton: open a
/// storage transaction, lock the payment row, sweep a lapsed
/// authorization, validate the status transition, compute the money
/// split, post the balanced ledger transaction, update the payment row,
/// commit. The row lock makes concurrent mutations on one payment
/// execute in a total order.
pub struct PaymentService {
    pool: PgPool,
    payments: PaymentRepository,
    ledger: LedgerService,
    gate: IdempotencyGate,
    fee_percent: u32,
    auth_expiry_days: i64,
}

impl PaymentService {
    pub fn new(pool: PgPool, fee_percent: u32, auth_expiry_days: i64) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            ledger: LedgerService::new(pool.clone()),
            gate: IdempotencyGate::new(pool.clone()),
            pool,
            fee_percent,
            auth_expiry_days,
        }
    }

    /// Authorizes a new payment: creates the payment row and places the
    /// hold (`DEBIT customer_holds / CREDIT customer_funds`).
    pub async fn authorize(
        &self,
        params: AuthorizeParams,
        idempotency_key: &str,
    ) -> Result<Payment> {
        if params.amount <= Decimal::ZERO {
            return Err(AppError::invalid_amount(
                format!("authorization amount must be positive, got {}", params.amount),
                Some(params.amount),
                None,
            ));
        }
        validate_metadata(params.metadata.as_ref())?;

        let request_hash = IdempotencyGate::hash_projection(&json!({
            "endpoint": "authorize",
            "amount": params.amount,
            "currency": params.currency,
        }));

        if let GateOutcome::Replay(record) = self.gate.check(idempotency_key, &request_hash).await?
        {
            return stored_payment(record.response_body);
        }

        // Covers retries that land after commit but before the key
        // record is written, and reuse of a key past its TTL: the
        // payment row itself carries the key under a unique index.
        if let Some(existing) = self
            .payments
            .find_by_idempotency_key(idempotency_key)
            .await?
        {
            return replay_or_conflict(existing, &params, idempotency_key);
        }

        let payment = Payment::authorized(
            params.amount,
            params.currency,
            params.description.clone(),
            params.metadata.clone(),
            idempotency_key.to_string(),
            self.auth_expiry_days,
        );

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let payment = match PaymentRepository::insert(&mut tx, &payment).await {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err, "idx_payments_idempotency_key") => {
                drop(tx);
                let existing = self
                    .payments
                    .find_by_idempotency_key(idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "payment row for idempotency key vanished after unique violation"
                        ))
                    })?;
                return replay_or_conflict(existing, &params, idempotency_key);
            }
            Err(err) => return Err(err),
        };

        LedgerService::post_transaction_in(
            &mut tx,
            LedgerTransactionInput::new(format!("authorization hold for {}", payment.id))
                .with_reference(PAYMENT_REFERENCE, &payment.id)
                .debit(system::CUSTOMER_HOLDS, payment.authorized_amount)
                .credit(system::CUSTOMER_FUNDS, payment.authorized_amount),
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.record_key(idempotency_key, &payment, &request_hash, 201)
            .await;
        metrics::counter!("payment_operations_total", "operation" => "authorize").increment(1);
        info!(payment_id = %payment.id, amount = %payment.amount, currency = %payment.currency, "payment authorized");

        Ok(payment)
    }

    /// Captures an authorized payment. The hold is released for the
    /// full authorized amount even on a partial capture; the captured
    /// amount is split between the merchant and the platform fee. A fee
    /// that truncates to zero leaves the whole amount with the merchant.
    pub async fn capture(
        &self,
        payment_id: &str,
        params: CaptureParams,
        idempotency_key: &str,
    ) -> Result<Payment> {
        self.gate.ensure_key(idempotency_key)?;

        let (mut tx, mut payment) = self.begin_locked(payment_id, "capture").await?;

        // The projection hashes the effective amount, resolved under
        // the row lock, so an omitted amount and an explicit amount
        // equal to the default are the same request.
        let amount = params.amount.unwrap_or(payment.authorized_amount);
        let request_hash = IdempotencyGate::hash_projection(&json!({
            "endpoint": "capture",
            "payment_id": payment_id,
            "amount": amount,
        }));
        if let GateOutcome::Replay(record) = self
            .gate
            .check_in(&mut tx, idempotency_key, &request_hash)
            .await?
        {
            drop(tx);
            return stored_payment(record.response_body);
        }

        ensure_transition(payment.status, PaymentStatus::Captured, "capture")?;

        if amount <= Decimal::ZERO {
            return Err(AppError::invalid_amount(
                format!("capture amount must be positive, got {}", amount),
                Some(amount),
                Some(payment.authorized_amount),
            ));
        }
        if amount > payment.authorized_amount {
            return Err(AppError::invalid_amount(
                format!(
                    "capture amount {} exceeds authorized amount {}",
                    amount, payment.authorized_amount
                ),
                Some(amount),
                Some(payment.authorized_amount),
            ));
        }

        let split = money::split_fee(amount, self.fee_percent);

        let mut input = LedgerTransactionInput::new(format!("capture for {}", payment.id))
            .with_reference(PAYMENT_REFERENCE, &payment.id)
            .debit(system::CUSTOMER_FUNDS, payment.authorized_amount)
            .credit(system::CUSTOMER_HOLDS, payment.authorized_amount);
        if split.merchant_share > Decimal::ZERO {
            input = input
                .debit(system::CUSTOMER_FUNDS, split.merchant_share)
                .credit(system::MERCHANT_PAYABLE, split.merchant_share);
        }
        if split.fee > Decimal::ZERO {
            input = input
                .debit(system::CUSTOMER_FUNDS, split.fee)
                .credit(system::PLATFORM_FEES, split.fee);
        }
        LedgerService::post_transaction_in(&mut tx, input).await?;

        payment.status = PaymentStatus::Captured;
        payment.captured_amount = amount;
        payment.expires_at = None;
        payment.updated_at = Utc::now();
        let payment = PaymentRepository::update_state(&mut tx, &payment).await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.record_key(idempotency_key, &payment, &request_hash, 200)
            .await;
        metrics::counter!("payment_operations_total", "operation" => "capture").increment(1);
        info!(payment_id = %payment.id, amount = %amount, fee = %split.fee, "payment captured");

        Ok(payment)
    }

    /// Voids an authorized payment, releasing the hold in full.
    pub async fn void(&self, payment_id: &str, idempotency_key: &str) -> Result<Payment> {
        let request_hash = IdempotencyGate::hash_projection(&json!({
            "endpoint": "void",
            "payment_id": payment_id,
        }));
        if let GateOutcome::Replay(record) = self.gate.check(idempotency_key, &request_hash).await?
        {
            return stored_payment(record.response_body);
        }

        let (mut tx, mut payment) = self.begin_locked(payment_id, "void").await?;
        ensure_transition(payment.status, PaymentStatus::Voided, "void")?;

        LedgerService::post_transaction_in(
            &mut tx,
            release_hold(&payment, format!("void for {}", payment.id)),
        )
        .await?;

        payment.status = PaymentStatus::Voided;
        payment.expires_at = None;
        payment.updated_at = Utc::now();
        let payment = PaymentRepository::update_state(&mut tx, &payment).await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.record_key(idempotency_key, &payment, &request_hash, 200)
            .await;
        metrics::counter!("payment_operations_total", "operation" => "void").increment(1);
        info!(payment_id = %payment.id, "payment voided");

        Ok(payment)
    }

    /// Settles a captured payment: moves the merchant share out of
    /// `merchant_payable` against `platform_cash`. Amount counters do
    /// not change.
    pub async fn settle(&self, payment_id: &str, idempotency_key: &str) -> Result<Payment> {
        let request_hash = IdempotencyGate::hash_projection(&json!({
            "endpoint": "settle",
            "payment_id": payment_id,
        }));
        if let GateOutcome::Replay(record) = self.gate.check(idempotency_key, &request_hash).await?
        {
            return stored_payment(record.response_body);
        }

        let (mut tx, mut payment) = self.begin_locked(payment_id, "settle").await?;
        ensure_transition(payment.status, PaymentStatus::Settled, "settle")?;

        let split = money::split_fee(payment.captured_amount, self.fee_percent);
        if split.merchant_share > Decimal::ZERO {
            LedgerService::post_transaction_in(
                &mut tx,
                LedgerTransactionInput::new(format!("settlement for {}", payment.id))
                    .with_reference(PAYMENT_REFERENCE, &payment.id)
                    .debit(system::MERCHANT_PAYABLE, split.merchant_share)
                    .credit(system::PLATFORM_CASH, split.merchant_share),
            )
            .await?;
        }

        payment.status = PaymentStatus::Settled;
        payment.updated_at = Utc::now();
        let payment = PaymentRepository::update_state(&mut tx, &payment).await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.record_key(idempotency_key, &payment, &request_hash, 200)
            .await;
        metrics::counter!("payment_operations_total", "operation" => "settle").increment(1);
        info!(payment_id = %payment.id, merchant_share = %split.merchant_share, "payment settled");

        Ok(payment)
    }

    /// Refunds part or all of the captured amount, reversing the
    /// merchant and fee portions proportionally. A refund that brings
    /// `refunded_amount` up to `captured_amount` moves the payment to
    /// `refunded`; anything less moves it to `partially_refunded`.
    pub async fn refund(
        &self,
        payment_id: &str,
        params: RefundParams,
        idempotency_key: &str,
    ) -> Result<Payment> {
        self.gate.ensure_key(idempotency_key)?;

        let (mut tx, mut payment) = self.begin_locked(payment_id, "refund").await?;

        // Effective amount resolved under the row lock, as in capture:
        // an omitted amount and an explicit amount equal to the
        // remaining refundable amount hash identically.
        let remaining = payment.refundable_amount();
        let amount = params.amount.unwrap_or(remaining);
        let request_hash = IdempotencyGate::hash_projection(&json!({
            "endpoint": "refund",
            "payment_id": payment_id,
            "amount": amount,
        }));
        if let GateOutcome::Replay(record) = self
            .gate
            .check_in(&mut tx, idempotency_key, &request_hash)
            .await?
        {
            drop(tx);
            return stored_payment(record.response_body);
        }

        ensure_transition(payment.status, PaymentStatus::Refunded, "refund")?;

        if amount <= Decimal::ZERO {
            return Err(AppError::invalid_amount(
                format!("refund amount must be positive, got {}", amount),
                Some(amount),
                Some(remaining),
            ));
        }
        if amount > remaining {
            return Err(AppError::invalid_amount(
                format!(
                    "refund amount {} exceeds refundable amount {}",
                    amount, remaining
                ),
                Some(amount),
                Some(remaining),
            ));
        }

        let split = money::split_fee(amount, self.fee_percent);

        let mut input = LedgerTransactionInput::new(format!("refund for {}", payment.id))
            .with_reference(PAYMENT_REFERENCE, &payment.id);
        if split.merchant_share > Decimal::ZERO {
            input = input.debit(system::MERCHANT_PAYABLE, split.merchant_share);
        }
        input = input.credit(system::CUSTOMER_FUNDS, amount);
        if split.fee > Decimal::ZERO {
            input = input.debit(system::PLATFORM_FEES, split.fee);
        }
        LedgerService::post_transaction_in(&mut tx, input).await?;

        payment.refunded_amount += amount;
        payment.status = if payment.refunded_amount == payment.captured_amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        payment.updated_at = Utc::now();
        let payment = PaymentRepository::update_state(&mut tx, &payment).await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.record_key(idempotency_key, &payment, &request_hash, 200)
            .await;
        metrics::counter!("payment_operations_total", "operation" => "refund").increment(1);
        info!(payment_id = %payment.id, amount = %amount, status = %payment.status, "payment refunded");

        Ok(payment)
    }

    /// Current payment state. A pure read: it does not run the
    /// expiration sweep, so a lapsed authorization still reads as
    /// `authorized` until a mutating operation touches it.
    pub async fn get_payment(&self, payment_id: &str) -> Result<Payment> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment '{}' not found", payment_id)))
    }

    /// Payments in reverse-chronological order with cursor pagination.
    /// The cursor is the last payment ID of the previous page.
    pub async fn list_payments(&self, params: ListParams) -> Result<PaymentPage> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut rows = self
            .payments
            .list(limit + 1, params.cursor.as_deref(), params.status)
            .await?;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|p| p.id.clone())
        } else {
            None
        };

        Ok(PaymentPage {
            data: rows,
            has_more,
            next_cursor,
        })
    }

    /// Full ledger audit trail of a payment, oldest transaction first.
    pub async fn get_payment_ledger(
        &self,
        payment_id: &str,
    ) -> Result<Vec<TransactionWithEntries>> {
        if self.payments.find_by_id(payment_id).await?.is_none() {
            return Err(AppError::not_found(format!(
                "payment '{}' not found",
                payment_id
            )));
        }

        self.ledger
            .get_transactions_by_reference(PAYMENT_REFERENCE, payment_id)
            .await
    }

    pub async fn get_account_balance(&self, account_id: &str) -> Result<AccountBalance> {
        self.ledger.get_account_balance(account_id).await
    }

    /// Opens the storage transaction and takes the row lock. When the
    /// locked payment turns out to be a lapsed authorization, the sweep
    /// posts the release entries, marks it `expired`, commits, and fails
    /// the requested operation with an invalid-state error.
    async fn begin_locked(
        &self,
        payment_id: &str,
        action: &'static str,
    ) -> Result<(Transaction<'static, Postgres>, Payment)> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let payment = PaymentRepository::lock_by_id(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment '{}' not found", payment_id)))?;

        if payment.is_authorization_expired(Utc::now()) {
            let expired = Self::apply_expiry(&mut tx, payment).await?;
            tx.commit().await.map_err(AppError::Database)?;
            metrics::counter!("payment_operations_total", "operation" => "expire").increment(1);
            info!(payment_id = %expired.id, "lapsed authorization expired on access");

            return Err(AppError::InvalidStateTransition {
                current: expired.status,
                attempted: action.to_string(),
                allowed: vec![],
            });
        }

        Ok((tx, payment))
    }

    /// Posts the void-shaped release and marks the payment `expired`,
    /// inside the caller's storage transaction.
    async fn apply_expiry(
        tx: &mut Transaction<'_, Postgres>,
        mut payment: Payment,
    ) -> Result<Payment> {
        PaymentStateMachine::validate_transition(payment.status, PaymentStatus::Expired)?;

        LedgerService::post_transaction_in(
            tx,
            release_hold(&payment, format!("authorization expiry for {}", payment.id)),
        )
        .await?;

        payment.status = PaymentStatus::Expired;
        payment.expires_at = None;
        payment.updated_at = Utc::now();
        PaymentRepository::update_state(tx, &payment).await
    }

    /// Best-effort write of the idempotency record after commit; the
    /// payment row carries the key independently.
    async fn record_key(
        &self,
        idempotency_key: &str,
        payment: &Payment,
        request_hash: &str,
        response_code: i32,
    ) {
        if let Err(err) = self
            .gate
            .record(
                idempotency_key,
                PAYMENT_REFERENCE,
                &payment.id,
                request_hash,
                response_code,
                payment,
            )
            .await
        {
            warn!(
                payment_id = %payment.id,
                key = %crate::observability::mask_sensitive(idempotency_key, 4),
                error = %err,
                "failed to record idempotency key"
            );
        }
    }
}

/// The void-shaped ledger transaction releasing the full hold.
fn release_hold(payment: &Payment, description: String) -> LedgerTransactionInput {
    LedgerTransactionInput::new(description)
        .with_reference(PAYMENT_REFERENCE, &payment.id)
        .debit(system::CUSTOMER_FUNDS, payment.authorized_amount)
        .credit(system::CUSTOMER_HOLDS, payment.authorized_amount)
}

/// Maps a state-machine rejection onto the operation the caller asked
/// for, with the allowed set expressed as actions.
fn ensure_transition(
    from: PaymentStatus,
    to: PaymentStatus,
    action: &'static str,
) -> Result<()> {
    PaymentStateMachine::validate_transition(from, to).map_err(|err| match err {
        AppError::InvalidStateTransition { current, .. } => {
            let mut allowed: Vec<String> = PaymentStateMachine::valid_transitions(current)
                .iter()
                .map(|target| action_for(*target).to_string())
                .collect();
            allowed.dedup();
            AppError::InvalidStateTransition {
                current,
                attempted: action.to_string(),
                allowed,
            }
        }
        other => other,
    })?;
    Ok(())
}

fn action_for(target: PaymentStatus) -> &'static str {
    match target {
        PaymentStatus::Created => "create",
        PaymentStatus::Authorized => "authorize",
        PaymentStatus::Captured => "capture",
        PaymentStatus::Settled => "settle",
        PaymentStatus::Voided => "void",
        PaymentStatus::Expired => "expire",
        PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => "refund",
    }
}

fn validate_metadata(metadata: Option<&serde_json::Value>) -> Result<()> {
    let Some(value) = metadata else {
        return Ok(());
    };

    let object = value
        .as_object()
        .ok_or_else(|| AppError::validation("metadata must be a JSON object"))?;

    if object.len() > MAX_METADATA_KEYS {
        return Err(AppError::validation(format!(
            "metadata supports at most {} keys, got {}",
            MAX_METADATA_KEYS,
            object.len()
        )));
    }

    for (key, value) in object {
        if !value.is_string() {
            return Err(AppError::validation(format!(
                "metadata value for '{}' must be a string",
                key
            )));
        }
    }

    Ok(())
}

fn stored_payment(body: serde_json::Value) -> Result<Payment> {
    serde_json::from_value(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("deserializing stored response: {}", e)))
}

fn replay_or_conflict(
    existing: Payment,
    params: &AuthorizeParams,
    idempotency_key: &str,
) -> Result<Payment> {
    if existing.amount == params.amount && existing.currency == params.currency {
        Ok(existing)
    } else {
        Err(AppError::IdempotencyConflict(format!(
            "idempotency key '{}' was already used with different parameters",
            idempotency_key
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metadata_validation() {
        assert!(validate_metadata(None).is_ok());
        assert!(validate_metadata(Some(&json!({"order": "42"}))).is_ok());
        assert!(validate_metadata(Some(&json!("flat string"))).is_err());
        assert!(validate_metadata(Some(&json!({"nested": {"a": 1}}))).is_err());

        let eleven: serde_json::Value = json!({
            "k1": "v", "k2": "v", "k3": "v", "k4": "v", "k5": "v", "k6": "v",
            "k7": "v", "k8": "v", "k9": "v", "k10": "v", "k11": "v"
        });
        assert!(validate_metadata(Some(&eleven)).is_err());
    }

    #[test]
    fn test_ensure_transition_names_actions() {
        let err = ensure_transition(PaymentStatus::Authorized, PaymentStatus::Settled, "settle")
            .unwrap_err();
        match err {
            AppError::InvalidStateTransition {
                current,
                attempted,
                allowed,
            } => {
                assert_eq!(current, PaymentStatus::Authorized);
                assert_eq!(attempted, "settle");
                assert_eq!(allowed, vec!["capture", "void", "expire"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_refund_actions_deduplicated() {
        let err = ensure_transition(PaymentStatus::Refunded, PaymentStatus::Captured, "capture")
            .unwrap_err();
        match err {
            AppError::InvalidStateTransition { allowed, .. } => assert!(allowed.is_empty()),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = ensure_transition(PaymentStatus::Authorized, PaymentStatus::Refunded, "refund")
            .unwrap_err();
        match err {
            AppError::InvalidStateTransition { allowed, .. } => {
                assert_eq!(allowed, vec!["capture", "void", "expire"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_release_hold_shape() {
        let payment = Payment::authorized(
            dec!(5000),
            Currency::USD,
            None,
            None,
            "key".to_string(),
            7,
        );
        let input = release_hold(&payment, "void".to_string());
        assert_eq!(input.entries.len(), 2);
        assert_eq!(input.entries[0].account_id, system::CUSTOMER_FUNDS);
        assert_eq!(input.entries[1].account_id, system::CUSTOMER_HOLDS);
        assert_eq!(input.reference_id.as_deref(), Some(payment.id.as_str()));
    }

    #[test]
    fn test_replay_or_conflict() {
        let payment = Payment::authorized(
            dec!(10000),
            Currency::USD,
            None,
            None,
            "key".to_string(),
            7,
        );

        let same = AuthorizeParams {
            amount: dec!(10000),
            currency: Currency::USD,
            description: None,
            metadata: None,
        };
        let replayed = replay_or_conflict(payment.clone(), &same, "key").unwrap();
        assert_eq!(replayed.id, payment.id);

        let different = AuthorizeParams {
            amount: dec!(99999),
            currency: Currency::USD,
            description: None,
            metadata: None,
        };
        let err = replay_or_conflict(payment, &different, "key").unwrap_err();
        assert_eq!(err.kind(), "idempotency_conflict");
    }
}
