use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::kitchen::KitchenError;
use crate::models::api::{CreateJobRequest, JobListQuery, JobListResponse, JobResponse};
use crate::models::job::{JobId, SyncState};
use crate::services::status_source::SourceError;

/// GET /api/v1/jobs: merged job list, newest first, optionally one status only.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Json<JobListResponse> {
    let view = state.kitchen.view();
    let jobs = match query.status {
        Some(status) => view.with_status(status).map(JobResponse::from).collect(),
        None => view.jobs.iter().map(JobResponse::from).collect(),
    };

    Json(JobListResponse {
        jobs,
        counts: view.counts,
        remote: view.remote,
        offline: view.remote.is_offline(),
        revision: view.revision,
    })
}

/// POST /api/v1/jobs: accept a new job for cooking.
///
/// 201 once the status source has it, 202 while it is kept locally for a retry.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), StatusCode> {
    request.validate().map_err(|e| {
        tracing::debug!(error = %e, "Rejecting invalid job request");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let job = state
        .kitchen
        .create_job(request.image_ref, request.style)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to accept job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let status = if job.sync == SyncState::PendingUpload {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(JobResponse::from(&job))))
}

/// DELETE /api/v1/jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let id = JobId::new(id);
    match state.kitchen.delete_job(&id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(KitchenError::UnknownJob(_)) => Err(StatusCode::NOT_FOUND),
        Err(KitchenError::Source(e @ SourceError::DeleteFailed { .. })) => {
            tracing::warn!(job_id = %id, error = %e, "Remote delete failed, job kept");
            Err(StatusCode::BAD_GATEWAY)
        }
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Failed to delete job");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/v1/jobs/refresh: poll the status source now.
pub async fn refresh(State(state): State<AppState>) -> StatusCode {
    state.kitchen.refresh();
    StatusCode::ACCEPTED
}
