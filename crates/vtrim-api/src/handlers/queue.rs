//! Queue visibility.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vtrim_models::Priority;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub express: u64,
    pub standard: u64,
    pub total: u64,
}

/// GET /api/queue/status
pub async fn get_queue_status(State(state): State<AppState>) -> ApiResult<Json<QueueStatusResponse>> {
    let express = state.queue.len(Priority::Express).await?;
    let standard = state.queue.len(Priority::Standard).await?;
    metrics::set_queue_length(Priority::Express.as_str(), express);
    metrics::set_queue_length(Priority::Standard.as_str(), standard);

    Ok(Json(QueueStatusResponse {
        express,
        standard,
        total: express + standard,
    }))
}
