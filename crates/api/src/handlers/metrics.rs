//! Handler for browser completion telemetry.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/v1/metrics
///
/// Accepts either a plain JSON body or the `{"__ow_body": "<base64>"}`
/// wrapper. The body is read raw so both shapes, and an empty body, reach
/// the sink without an extractor rejecting them first.
///
/// Returns 204 once the line is in the local log. Relaying to the external
/// collector happens afterwards and never affects the response.
pub async fn ingest_metrics(State(state): State<AppState>, body: Bytes) -> AppResult<StatusCode> {
    state.metrics.ingest(&body).await?;
    Ok(StatusCode::NO_CONTENT)
}
