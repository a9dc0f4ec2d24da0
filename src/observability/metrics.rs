use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the Prometheus recorder and registers the engine's metric
/// descriptions. Returns the render handle for the `/metrics` endpoint,
/// or `None` when a recorder is already installed (tests).
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            metrics::describe_counter!(
                "payment_operations_total",
                "Completed payment mutations by operation"
            );
            metrics::describe_counter!(
                "ledger_transactions_posted_total",
                "Balanced ledger transactions committed"
            );
            Some(handle)
        }
        Err(err) => {
            tracing::warn!("failed to install metrics recorder: {}", err);
            None
        }
    }
}
