use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Room for multipart boundaries and the name field on top of the archive
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(
        state
            .config
            .analysis_service
            .max_upload_bytes
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/analysis", get(handlers::analysis::list_jobs))
        .route("/analysis/start", post(handlers::analysis::start_analysis))
        .route(
            "/analysis/status/:job_id",
            get(handlers::analysis::get_job_status),
        )
        .route(
            "/analysis/reprocess/:job_id",
            post(handlers::analysis::reprocess_job),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
