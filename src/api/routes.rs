use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Settings;
use crate::services::PaymentService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pool: PgPool, settings: Settings) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            metrics_handle: None,
        }
    }

    /// Adds the Prometheus render handle to the state.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics_handle = handle;
        self
    }

    /// Builds a payment engine bound to this state's pool and settings.
    pub fn payments(&self) -> PaymentService {
        PaymentService::new(
            self.pool.clone(),
            self.settings.application.platform_fee_percent,
            self.settings.application.auth_expiry_days,
        )
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Payment endpoints
        .route(
            "/payments",
            post(handlers::authorize_payment).get(handlers::list_payments),
        )
        .route("/payments/:id", get(handlers::get_payment))
        .route("/payments/:id/capture", post(handlers::capture_payment))
        .route("/payments/:id/void", post(handlers::void_payment))
        .route("/payments/:id/settle", post(handlers::settle_payment))
        .route("/payments/:id/refund", post(handlers::refund_payment))
        .route("/payments/:id/ledger", get(handlers::get_payment_ledger))
        // Account endpoints
        .route("/accounts/:id/balance", get(handlers::get_account_balance))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
