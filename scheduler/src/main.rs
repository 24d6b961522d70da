// Scheduler binary entry point
// Hosts the status poller that drives pending analysis jobs to completion

use common::bootstrap::{init_analysis_service, init_database_pool, load_settings};
use common::poller::PollerConfig;
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = load_settings()?;

    // Structured JSON logging
    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    info!(
        poll_interval_seconds = settings.scheduler.poll_interval_seconds,
        analysis_service = %settings.analysis_service.base_url,
        "Starting analysis status poller"
    );

    telemetry::init_metrics(settings.scheduler.metrics_port)?;

    let db_pool = init_database_pool(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        e
    })?;

    let service = init_analysis_service(&settings, db_pool.clone())?;
    let poller = Arc::new(service.status_poller(PollerConfig::from(&settings.scheduler)));
    info!("Status poller created");

    // Set up graceful shutdown
    let poller_for_shutdown = Arc::clone(&poller);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal, initiating graceful shutdown");
                poller_for_shutdown.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    poller.start().await;

    db_pool.close().await;
    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}
