use std::time::Duration;

use payment_engine::api::{create_router, AppState};
use payment_engine::config::Settings;
use payment_engine::db;
use payment_engine::idempotency::IdempotencyGate;
use payment_engine::observability::{init_logging, init_metrics, LogConfig, LogFormat};
use tokio::net::TcpListener;
use tracing::info;

const IDEMPOTENCY_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration first (needed for log level)
    let settings = Settings::new()?;

    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .as_str(),
        ),
        include_target: true,
    };
    init_logging(&log_config);

    let metrics_handle = init_metrics();
    info!("configuration loaded, metrics initialized");

    info!("connecting to database...");
    let pool = db::connect(&settings.database).await?;
    info!("database connection established");

    info!("running database migrations...");
    db::MIGRATOR.run(&pool).await?;
    info!("migrations applied");

    // Expired idempotency keys are garbage-collected in the background;
    // expiry itself is enforced by the gate's live-record query.
    let cleanup_gate = IdempotencyGate::new(pool.clone());
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(IDEMPOTENCY_CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match cleanup_gate.cleanup_expired().await {
                Ok(removed) if removed > 0 => {
                    info!("removed {} expired idempotency keys", removed);
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("idempotency key cleanup failed: {}", err),
            }
        }
    });

    let port = settings.application.port;
    let state = AppState::new(pool, settings).with_metrics(metrics_handle);
    let app = create_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("payment engine listening on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
