use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Status channels currently open.
    pub open_channels: usize,
    /// Jobs the hub currently holds state for.
    pub tracked_jobs: usize,
    /// Whether metrics are relayed to the external collector.
    pub collector_configured: bool,
}

/// GET /health -- returns service health and relay counters.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        open_channels: state.channels.connection_count().await,
        tracked_jobs: state.jobs.job_count(),
        collector_configured: state.metrics.forwarding_enabled(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
