use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::state::AppState;

/// Health check endpoint; also pings the database when one is configured
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = pool.health_check().await {
            tracing::warn!(error = %e, "Health check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable");
        }
    }
    (StatusCode::OK, "OK")
}
