use anyhow::Result;
use std::net::SocketAddr;

mod handlers;
mod routes;
mod state;

use common::bootstrap::{init_analysis_service, init_database_pool, load_settings};
use common::telemetry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_settings()?;

    // Initialize tracing
    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting API server"
    );

    // Initialize Prometheus metrics exporter
    telemetry::init_metrics(config.observability.metrics_port)?;

    // Initialize database connection pool and schema
    let db_pool = init_database_pool(&config).await?;

    let service = init_analysis_service(&config, db_pool.clone())?;

    // Create application state
    let state = AppState::new(service, db_pool.clone(), config.clone());

    // Create router
    let app = routes::create_router(state);

    // Start server
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    telemetry::shutdown_tracer();
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
