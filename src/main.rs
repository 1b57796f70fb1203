//! pitbossd - session ledger daemon.

use anyhow::Context;
use pitboss::config::{self, Config, LogFormat};
use pitboss::db::Database;
use pitboss::network::Gateway;
use pitboss::security::{HmacTokenVerifier, IdentityVerifier};
use pitboss::services::{LogSink, OutboxWorker, spawn_heartbeat_reaper};
use pitboss::state::Hub;
use pitboss::{http, metrics};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    init_tracing(config.server.log_format);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s). See messages above.",
            errors.len()
        ));
    }

    info!(server = %config.server.name, "Starting pitboss");

    // Initialize database
    let db = Database::new(&config.database.path).await?;

    let verifier: Arc<dyn IdentityVerifier> =
        Arc::new(HmacTokenVerifier::new(&config.auth.token_secret));
    let hub = Hub::new(db.clone(), verifier, config.limits.clone());

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        let shutdown = hub.shutdown_token();
        tokio::spawn(async move {
            http::run_http_server(metrics_port, shutdown).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let outbox = OutboxWorker::new(db.clone(), Arc::new(LogSink), config.outbox.clone())
        .spawn(hub.shutdown_token());
    info!("Outbox worker started");

    let reaper = spawn_heartbeat_reaper(Arc::clone(&hub), &config.heartbeat);
    info!(
        timeout_secs = config.heartbeat.timeout_secs,
        "Heartbeat reaper started"
    );

    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received"),
                Err(e) => warn!(error = %e, "Failed to listen for interrupt; shutting down"),
            }
            hub.shutdown().await;
        });
    }

    let gateway = Gateway::bind(&config.listen, Arc::clone(&hub)).await?;
    gateway.run().await?;

    // Let background tasks observe the cancellation before the pool closes.
    let _ = tokio::join!(outbox, reaper);
    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
