//! Direct-to-store upload initialisation.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::OwnerId;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{accepted_upload_types, upload_extension};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub content_type: String,
    /// Declared size in bytes
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_url: String,
    /// Key to submit as a blob source once the upload finishes
    pub file_key: String,
    pub expires_in: u64,
}

/// POST /api/uploads
pub async fn init_upload(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(request): Json<InitUploadRequest>,
) -> ApiResult<Json<InitUploadResponse>> {
    let ext = upload_extension(&request.content_type).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unsupported content type '{}'; expected one of {}",
            request.content_type,
            accepted_upload_types().join(", ")
        ))
    })?;
    if request.size == 0 {
        return Err(ApiError::bad_request("File is empty"));
    }
    if request.size > state.config.max_upload_bytes {
        return Err(ApiError::bad_request(format!(
            "File too large: {} bytes (max {} bytes)",
            request.size, state.config.max_upload_bytes
        )));
    }

    if !state.upload_limiter.check(&owner.0) {
        warn!(owner = %owner.as_str(), "Upload rate limit exceeded");
        metrics::record_rate_limit_hit("/api/uploads");
        return Err(ApiError::RateLimited);
    }

    let file_key = format!("uploads/{}/{}.{}", owner.as_str(), uuid::Uuid::new_v4(), ext);
    let ttl = state.config.upload_url_ttl;
    let upload_url = state
        .store
        .presign_upload(&file_key, &request.content_type, ttl)
        .await?;

    metrics::record_upload_initialized(&request.content_type);
    info!(owner = %owner.as_str(), key = %file_key, size = request.size, "Upload initialised");

    Ok(Json(InitUploadResponse {
        upload_url,
        file_key,
        expires_in: ttl.as_secs(),
    }))
}
