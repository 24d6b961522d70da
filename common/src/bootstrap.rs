// Bootstrap utilities for binary initialization
// Shared by the api and scheduler main.rs files

use crate::analysis_client::{AnalysisClient, HttpAnalysisClient};
use crate::config::Settings;
use crate::db::{DbPool, JobStore, PgJobStore, PgReportStore, ReportStore};
use crate::service::AnalysisService;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize the database pool and apply migrations
/// Used by: API server, Scheduler
///
/// # Errors
/// Returns error if the pool cannot connect or a migration fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    db_pool
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Build the analysis service on Postgres-backed stores
/// Used by: API server, Scheduler
///
/// # Errors
/// Returns error if the HTTP client for the analysis service cannot be built
#[tracing::instrument(skip(settings, db_pool))]
pub fn init_analysis_service(settings: &Settings, db_pool: DbPool) -> Result<Arc<AnalysisService>> {
    info!(
        base_url = %settings.analysis_service.base_url,
        "Initializing analysis service client"
    );

    let client: Arc<dyn AnalysisClient> = Arc::new(
        HttpAnalysisClient::new(&settings.analysis_service)
            .context("Failed to create analysis service client")?,
    );
    let job_store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool.clone()));
    let report_store: Arc<dyn ReportStore> = Arc::new(PgReportStore::new(db_pool));

    Ok(Arc::new(AnalysisService::new(
        job_store,
        report_store,
        client,
        settings.analysis_service.max_upload_bytes,
    )))
}

/// Load and validate settings
///
/// # Errors
/// Returns error if configuration cannot be loaded or is invalid
pub fn load_settings() -> Result<Settings> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(settings)
}
