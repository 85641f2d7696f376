//! Job submission, status polling and result retrieval.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vtrim_models::{JobId, JobState, JobStatusSnapshot, OwnerConnection, SubmitRequest, SubmitResponse};

use crate::auth::OwnerId;
use crate::error::{ApiError, ApiResult};
use crate::services::submit_trim;
use crate::state::AppState;

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobBody {
    /// Status socket that should receive this job's events
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(flatten)]
    pub request: SubmitRequest,
}

/// Signed URL for a finished artifact.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultUrlResponse {
    pub job_id: JobId,
    pub result_ref: String,
    pub url: String,
    pub expires_in: u64,
}

/// POST /api/jobs
///
/// Validates and enqueues a trim. Without a `connectionId` the job still
/// runs; its events are dropped and the client polls instead.
pub async fn submit_job(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(body): Json<SubmitJobBody>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let connection_id = body
        .connection_id
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("poll-{}", uuid::Uuid::new_v4()));
    let job = submit_trim(&state, body.request, OwnerConnection::new(owner.as_str(), connection_id)).await?;
    info!(owner = %owner.as_str(), job_id = %job.id, "Accepted job over HTTP");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            priority: job.priority,
        }),
    ))
}

/// GET /api/jobs/:job_id
///
/// Last known status. Snapshots expire a few hours after the last event.
pub async fn get_job_status(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusSnapshot>> {
    Ok(Json(owned_snapshot(&state, &owner, job_id).await?))
}

/// GET /api/jobs/:job_id/result
pub async fn get_job_result(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ResultUrlResponse>> {
    let snapshot = owned_snapshot(&state, &owner, job_id).await?;
    let result_ref = match (snapshot.state, snapshot.result_ref) {
        (JobState::Completed, Some(result_ref)) => result_ref,
        (JobState::Failed, _) => {
            let message = snapshot
                .failure
                .map(|f| f.message)
                .unwrap_or_else(|| "Job failed".to_string());
            return Err(ApiError::conflict(format!("Job failed: {}", message)));
        }
        (other, _) => {
            return Err(ApiError::conflict(format!("Job is still {}", other.as_str())));
        }
    };

    let ttl = state.config.result_url_ttl;
    let url = state.store.presign_download(&result_ref, ttl).await?;
    Ok(Json(ResultUrlResponse {
        job_id: snapshot.job_id,
        result_ref,
        url,
        expires_in: ttl.as_secs(),
    }))
}

async fn owned_snapshot(state: &AppState, owner: &OwnerId, job_id: String) -> ApiResult<JobStatusSnapshot> {
    let job_id = JobId::from_string(job_id);
    if !job_id.is_well_formed() {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }
    let snapshot = state
        .status
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found or expired"))?;
    if snapshot.owner_id != owner.as_str() {
        return Err(ApiError::forbidden("Job belongs to another owner"));
    }
    Ok(snapshot)
}
