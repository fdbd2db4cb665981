//! Job submission, status and cancellation handlers.
//!
//! REST is the durable surface: submission returns the persisted record
//! immediately, polling works whether or not a progress stream was ever
//! attached, and cancel is idempotent on terminal jobs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vcast_models::{Job, JobId, JobPayload, JobType};
use vcast_queue::{JobOverview, QueueStats};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Job submission request.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub owner: String,
    pub payload: JobPayload,
}

/// Cancellation response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// POST /api/jobs
///
/// Validate and enqueue a job. The returned id is usable for status and
/// progress queries immediately; invalid payloads are never enqueued.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    if req.owner.trim().is_empty() {
        return Err(ApiError::bad_request("owner must not be empty"));
    }
    req.payload
        .validate(req.job_type)
        .map_err(ApiError::Validation)?;

    let job = state
        .scheduler
        .submit(req.job_type, req.owner, req.payload)
        .await?;

    info!(job_id = %job.id, job_type = job.job_type.as_str(), "Job accepted");
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let id = JobId::from_string(job_id);
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No job with id {}", id)))
}

/// Query parameters for the job list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Restrict to one owner's jobs.
    #[serde(default)]
    pub owner: Option<String>,
}

/// GET /api/jobs?owner=
///
/// Active and pending jobs for UI display; pending jobs carry their
/// global queue position.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobOverview>> {
    Ok(Json(state.scheduler.overview(query.owner.as_deref())))
}

/// POST /api/jobs/:job_id/cancel
///
/// `success` is false when the job was already terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let id = JobId::from_string(job_id);
    if state.store.get(&id).is_none() {
        return Err(ApiError::not_found(format!("No job with id {}", id)));
    }

    let success = state.scheduler.cancel(&id).await;
    Ok(Json(CancelResponse { success }))
}

/// GET /api/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.scheduler.stats())
}
