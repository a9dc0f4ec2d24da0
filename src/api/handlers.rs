use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use super::requests::{
    AuthorizePaymentRequest, CapturePaymentRequest, ListPaymentsQuery, RefundPaymentRequest,
};
use super::responses::{
    ApiError, BalanceResponse, HealthResponse, LedgerTransactionResponse, ListResponse,
    PaymentResponse,
};
use super::routes::AppState;
use crate::error::AppError;
use crate::models::PaymentStatus;
use crate::services::ListParams;

fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::App(AppError::validation("the Idempotency-Key header is required"))
        })
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        database: db_healthy,
    })
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Authorize a new payment.
pub async fn authorize_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AuthorizePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let key = idempotency_key(&headers)?;
    let params = request.into_params().map_err(ApiError::Fields)?;

    let payment = state.payments().authorize(params, &key).await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// Capture an authorized payment.
pub async fn capture_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<CapturePaymentRequest>>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let key = idempotency_key(&headers)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let params = request.into_params().map_err(ApiError::Fields)?;

    let payment = state.payments().capture(&id, params, &key).await?;
    Ok(Json(payment.into()))
}

/// Void an authorized payment.
pub async fn void_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PaymentResponse>, ApiError> {
    let key = idempotency_key(&headers)?;

    let payment = state.payments().void(&id, &key).await?;
    Ok(Json(payment.into()))
}

/// Settle a captured payment.
pub async fn settle_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PaymentResponse>, ApiError> {
    let key = idempotency_key(&headers)?;

    let payment = state.payments().settle(&id, &key).await?;
    Ok(Json(payment.into()))
}

/// Refund a captured or settled payment.
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RefundPaymentRequest>>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let key = idempotency_key(&headers)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let params = request.into_params().map_err(ApiError::Fields)?;

    let payment = state.payments().refund(&id, params, &key).await?;
    Ok(Json(payment.into()))
}

/// Get a payment by ID. A pure read: no expiration sweep runs here.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.payments().get_payment(&id).await?;
    Ok(Json(payment.into()))
}

/// List payments with cursor pagination, newest first.
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListResponse<PaymentResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PaymentStatus>)
        .transpose()
        .map_err(|err| ApiError::App(AppError::validation(err)))?;

    let page = state
        .payments()
        .list_payments(ListParams {
            limit: query.limit,
            cursor: query.cursor,
            status,
        })
        .await?;

    Ok(Json(page.into()))
}

/// The ledger audit trail for a payment, oldest first.
pub async fn get_payment_ledger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListResponse<LedgerTransactionResponse>>, ApiError> {
    let transactions = state.payments().get_payment_ledger(&id).await?;

    Ok(Json(ListResponse {
        object: "list".to_string(),
        data: transactions
            .into_iter()
            .map(LedgerTransactionResponse::from)
            .collect(),
        has_more: false,
        next_cursor: None,
    }))
}

/// Derived balance of an account.
pub async fn get_account_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.payments().get_account_balance(&id).await?;
    Ok(Json(balance.into()))
}
