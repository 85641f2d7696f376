//! Submission path shared by the HTTP endpoint and the status socket.

use tracing::{debug, warn};

use vtrim_models::{FailureKind, Job, OwnerConnection, SourceRef, SubmitRequest, ValidationError};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::check_source_url;
use crate::state::AppState;

/// Screen, optionally probe, then validate and enqueue a trim request.
pub async fn submit_trim(state: &AppState, request: SubmitRequest, owner: OwnerConnection) -> ApiResult<Job> {
    let result = screen_and_submit(state, request, owner).await;
    match &result {
        Ok(job) => metrics::record_job_submitted(job.priority.as_str()),
        Err(e) => {
            if let Some(kind @ (FailureKind::Validation | FailureKind::SourceUnavailable)) = e.kind() {
                metrics::record_job_rejected(kind.as_str());
            }
        }
    }
    result
}

async fn screen_and_submit(state: &AppState, mut request: SubmitRequest, owner: OwnerConnection) -> ApiResult<Job> {
    // Cheap checks first so a bad range never costs a probe.
    let range = request.range()?;
    let max = state.submissions.limits().max_clip_secs;
    if range.duration() > max {
        return Err(ValidationError::TooLong {
            requested: range.duration(),
            max,
        }
        .into());
    }

    let mut source_duration = None;
    if let SourceRef::Url { url } = &request.source {
        let url = check_source_url(url).map_err(ValidationError::InvalidSource)?;
        if state.config.probe_on_submit {
            source_duration = probe_duration(state, &url).await?;
        }
        request.source = SourceRef::Url { url };
    }

    Ok(state.submissions.submit(request, owner, source_duration).await?)
}

/// Source duration for range validation.
///
/// A source that is definitely gone rejects the submission; any other probe
/// problem only skips the duration check and leaves it to the worker.
async fn probe_duration(state: &AppState, url: &str) -> ApiResult<Option<f64>> {
    match state.prober.probe(url).await {
        Ok(info) => {
            debug!(duration = ?info.duration, "Source duration resolved");
            Ok(info.duration)
        }
        Err(e) if e.kind() == FailureKind::SourceUnavailable => Err(ApiError::Media(e)),
        Err(e) => {
            warn!("Source probe failed, submitting without duration check: {}", e);
            Ok(None)
        }
    }
}
