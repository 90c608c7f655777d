use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .route("/api/jobs/trigger", post(handlers::jobs::trigger_job_check))
        .route("/api/transform", post(handlers::transform::transform))
        .route(
            "/api/invoke-api-transform",
            post(handlers::transform::invoke_api_transform),
        )
        .route("/soap/invoke", post(handlers::soap::invoke))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
