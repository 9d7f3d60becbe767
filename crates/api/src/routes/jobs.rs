//! Route definitions for job status reports.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{job_id}/status     -> get_status
/// POST   /{job_id}/status     -> report_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{job_id}/status",
        get(jobs::get_status).post(jobs::report_status),
    )
}
