use axum::{extract::State, Json};
use common::errors::ApiError;
use common::scheduler::ScanReport;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

/// Re-scan job definitions now
///
/// Run-once jobs execute before this returns; any that failed turn the
/// response into a 500 listing each failure.
#[tracing::instrument(skip(state))]
pub async fn trigger_job_check(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<ScanReport>>, ErrorResponse> {
    let report = state.scheduler.trigger_check().await.map_err(|e| {
        tracing::error!(error = %e, "Manual job check failed");
        ErrorResponse::from(ApiError::from(e))
    })?;

    tracing::info!(
        scheduled = report.scheduled.len(),
        replaced = report.replaced.len(),
        cancelled = report.cancelled.len(),
        completed = report.completed.len(),
        "Manual job check finished"
    );
    Ok(Json(SuccessResponse::new(report)))
}
