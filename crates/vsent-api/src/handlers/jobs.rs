//! Job submission, polling, result and cancellation handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vsent_models::{AnalysisDocument, JobId, SourceRef};

use crate::error::{ApiError, ApiResult};
use crate::services::JobStatusView;
use crate::state::AppState;

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Handle of a payload the server can already reach
    pub source_ref: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobStatusView>,
    pub total: usize,
}

/// POST /api/jobs
///
/// Returns:
/// - 202: Job accepted
/// - 400: Empty source reference
/// - 503: Too many pending jobs or shutting down
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let source_ref = request.source_ref.trim();
    if source_ref.is_empty() {
        return Err(ApiError::bad_request("source_ref must not be empty"));
    }

    let job_id = state.service.submit(SourceRef::new(source_ref))?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<ListJobsResponse> {
    let jobs = state.service.list();
    Json(ListJobsResponse {
        total: jobs.len(),
        jobs,
    })
}

/// GET /api/status/:job_id
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let view = state.service.poll(&parse_job_id(&job_id)?)?;
    Ok(Json(view))
}

/// GET /api/results/:job_id
///
/// Returns:
/// - 200: Analysis document
/// - 404: Unknown job
/// - 409: Processing not completed yet
/// - 422: Job failed
/// - 500: Stored result missing or unreadable
pub async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisDocument>> {
    let document = state.service.fetch_result(&parse_job_id(&job_id)?).await?;
    Ok(Json(document))
}

/// DELETE /api/jobs/:job_id
///
/// Returns:
/// - 202: Cancellation requested
/// - 404: Unknown job
/// - 409: Job already finished
/// - 503: Job not started yet, retry shortly
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobStatusView>)> {
    let job_id = parse_job_id(&job_id)?;
    let view = state.service.cancel(&job_id)?;
    info!(job_id = %job_id, "Cancel requested over HTTP");
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Ids that could never have been issued are reported as unknown.
fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    if is_valid_job_id(raw) {
        Ok(JobId::from_string(raw))
    } else {
        Err(ApiError::not_found("Job not found"))
    }
}

fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
