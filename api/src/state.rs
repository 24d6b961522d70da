use std::sync::Arc;

use common::config::Settings;
use common::db::DbPool;
use common::service::AnalysisService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(service: Arc<AnalysisService>, db_pool: DbPool, config: Settings) -> Self {
        Self {
            service,
            db_pool,
            config: Arc::new(config),
        }
    }
}
