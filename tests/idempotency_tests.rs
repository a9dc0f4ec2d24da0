mod common;

use rust_decimal_macros::dec;
use payment_engine::models::PaymentStatus;
use payment_engine::services::{CaptureParams, RefundParams};

#[tokio::test]
async fn test_authorize_replays_with_matching_parameters() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());
    let key = common::key();

    let first = service
        .authorize(common::authorize_params(10_000), &key)
        .await
        .unwrap();

    let second = service
        .authorize(common::authorize_params(10_000), &key)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, dec!(10000));

    // Only one hold was placed.
    assert_eq!(
        common::balance(&pool, payment_engine::models::system::CUSTOMER_HOLDS).await,
        dec!(10000)
    );
}

#[tokio::test]
async fn test_authorize_conflicts_with_different_parameters() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());
    let key = common::key();

    service
        .authorize(common::authorize_params(10_000), &key)
        .await
        .unwrap();

    let err = service
        .authorize(common::authorize_params(99_999), &key)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "idempotency_conflict");
}

#[tokio::test]
async fn test_empty_key_rejected_on_every_mutation() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());

    let err = service
        .authorize(common::authorize_params(1_000), "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let payment = service
        .authorize(common::authorize_params(1_000), &common::key())
        .await
        .unwrap();

    let err = service
        .capture(&payment.id, CaptureParams::default(), "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = service.void(&payment.id, "  ").await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = service.settle(&payment.id, "").await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = service
        .refund(&payment.id, RefundParams::default(), "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    // The rejected calls changed nothing.
    let reread = service.get_payment(&payment.id).await.unwrap();
    assert_eq!(reread.status, PaymentStatus::Authorized);
}

#[tokio::test]
async fn test_capture_replay_and_conflict() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());

    let payment = service
        .authorize(common::authorize_params(10_000), &common::key())
        .await
        .unwrap();

    let key = common::key();
    let captured = service
        .capture(
            &payment.id,
            CaptureParams {
                amount: Some(dec!(7000)),
            },
            &key,
        )
        .await
        .unwrap();
    assert_eq!(captured.captured_amount, dec!(7000));

    // Same key, same parameters: the stored response replays instead of
    // tripping the state machine.
    let replayed = service
        .capture(
            &payment.id,
            CaptureParams {
                amount: Some(dec!(7000)),
            },
            &key,
        )
        .await
        .unwrap();
    assert_eq!(replayed.id, captured.id);
    assert_eq!(replayed.captured_amount, dec!(7000));
    assert_eq!(replayed.status, PaymentStatus::Captured);

    // Same key, different amount: conflict.
    let err = service
        .capture(
            &payment.id,
            CaptureParams {
                amount: Some(dec!(5000)),
            },
            &key,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "idempotency_conflict");

    // The ledger saw exactly one capture.
    let ledger = service.get_payment_ledger(&payment.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn test_defaulted_amount_matches_explicit_equal_amount() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());

    // Capture with the amount omitted defaults to the full authorized
    // amount; a retry that spells the same amount out is the same
    // request and must replay, not conflict.
    let payment = service
        .authorize(common::authorize_params(10_000), &common::key())
        .await
        .unwrap();
    let key = common::key();
    let captured = service
        .capture(&payment.id, CaptureParams::default(), &key)
        .await
        .unwrap();
    assert_eq!(captured.captured_amount, dec!(10000));

    let replayed = service
        .capture(
            &payment.id,
            CaptureParams {
                amount: Some(dec!(10000)),
            },
            &key,
        )
        .await
        .unwrap();
    assert_eq!(replayed.id, captured.id);
    assert_eq!(replayed.updated_at, captured.updated_at);

    // Same equivalence for refund: omitted defaults to the remaining
    // refundable amount.
    let refund_key = common::key();
    let refunded = service
        .refund(&payment.id, RefundParams::default(), &refund_key)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    let replayed = service
        .refund(
            &payment.id,
            RefundParams {
                amount: Some(dec!(10000)),
            },
            &refund_key,
        )
        .await
        .unwrap();
    assert_eq!(replayed.updated_at, refunded.updated_at);

    // One capture and one refund in the ledger.
    let ledger = service.get_payment_ledger(&payment.id).await.unwrap();
    assert_eq!(ledger.len(), 3);
    common::assert_god_check(&pool).await;
}

#[tokio::test]
async fn test_void_and_settle_replay() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());

    let payment = service
        .authorize(common::authorize_params(5_000), &common::key())
        .await
        .unwrap();
    let void_key = common::key();
    let voided = service.void(&payment.id, &void_key).await.unwrap();
    let replayed = service.void(&payment.id, &void_key).await.unwrap();
    assert_eq!(voided.updated_at, replayed.updated_at);
    assert_eq!(replayed.status, PaymentStatus::Voided);

    let payment = service
        .authorize(common::authorize_params(5_000), &common::key())
        .await
        .unwrap();
    service
        .capture(&payment.id, CaptureParams::default(), &common::key())
        .await
        .unwrap();
    let settle_key = common::key();
    let settled = service.settle(&payment.id, &settle_key).await.unwrap();
    let replayed = service.settle(&payment.id, &settle_key).await.unwrap();
    assert_eq!(settled.updated_at, replayed.updated_at);

    // One settlement transaction, not two.
    let ledger = service.get_payment_ledger(&payment.id).await.unwrap();
    assert_eq!(ledger.len(), 3);

    common::assert_god_check(&pool).await;
}

#[tokio::test]
async fn test_key_reuse_across_payments_conflicts() {
    let Some(pool) = common::try_pool().await else { return };
    let _guard = common::lock().await;
    common::reset(&pool).await;

    let service = common::service(pool.clone());

    let first = service
        .authorize(common::authorize_params(1_000), &common::key())
        .await
        .unwrap();
    let second = service
        .authorize(common::authorize_params(1_000), &common::key())
        .await
        .unwrap();

    let key = common::key();
    service
        .capture(&first.id, CaptureParams::default(), &key)
        .await
        .unwrap();

    // The same key aimed at a different payment is a different request.
    let err = service
        .capture(&second.id, CaptureParams::default(), &key)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "idempotency_conflict");
}
