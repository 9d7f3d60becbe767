//! Handlers for job status reports.
//!
//! The renderer reports each transition here; the hub relays it to every
//! status channel open for the job.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use videogenie_core::error::CoreError;
use videogenie_core::job::{JobStatus, StatusEvent};
use videogenie_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a renderer status report.
#[derive(Debug, Deserialize)]
pub struct ReportStatus {
    pub status: JobStatus,
    #[serde(default)]
    pub url: Option<String>,
}

/// POST /api/v1/jobs/{job_id}/status
///
/// Publish a status transition. Returns 204 on success, 400 when the event
/// is malformed (bad id, or `url` present iff not `complete`), and 409 when
/// the transition would repeat or regress the job's status.
pub async fn report_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    input: Result<Json<ReportStatus>, JsonRejection>,
) -> AppResult<StatusCode> {
    let job_id = JobId::parse(job_id)?;
    let Json(input) = input.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let event = StatusEvent::new(input.status, input.url)?;

    let delivered = state.jobs.publish(&job_id, event)?;

    tracing::info!(
        job_id = %job_id,
        status = %input.status,
        delivered,
        "Job status published",
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/jobs/{job_id}/status
///
/// Latest known status of a job, 404 when nothing has been reported.
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<StatusEvent>>> {
    let job_id = JobId::parse(job_id)?;
    let event = state.jobs.latest(&job_id).ok_or_else(|| CoreError::NotFound {
        entity: "Job",
        id: job_id.to_string(),
    })?;

    Ok(Json(DataResponse { data: event }))
}
