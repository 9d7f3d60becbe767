pub mod health;
pub mod jobs;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws?jobId={job_id}                 job status channel (WebSocket)
///
/// /jobs/{job_id}/status              latest status (GET), renderer report (POST)
///
/// /metrics                           completion telemetry (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Job status channel.
        .route("/ws", get(ws::status_channel))
        // Renderer status reports.
        .nest("/jobs", jobs::router())
        // Browser telemetry.
        .route("/metrics", post(handlers::metrics::ingest_metrics))
}
