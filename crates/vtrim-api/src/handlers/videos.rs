//! Source metadata.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use vtrim_models::SourceInfo;

use crate::auth::OwnerId;
use crate::error::{ApiError, ApiResult};
use crate::security::check_source_url;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VideoInfoRequest {
    pub url: String,
}

/// POST /api/videos/info
///
/// Title, thumbnail, duration and selectable formats of a source URL.
pub async fn get_video_info(
    State(state): State<AppState>,
    _owner: OwnerId,
    Json(request): Json<VideoInfoRequest>,
) -> ApiResult<Json<SourceInfo>> {
    let url = check_source_url(&request.url).map_err(ApiError::bad_request)?;
    let info = state.prober.probe(&url).await?;
    Ok(Json(info))
}
