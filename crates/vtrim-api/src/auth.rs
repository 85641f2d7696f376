//! Owner identity.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! owner in `X-Owner-Id`. This service only checks that it is present and
//! well formed.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::security::is_valid_owner_id;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Authenticated owner of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing owner identity"))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid owner identity"))?
            .trim();
        if !is_valid_owner_id(value) {
            return Err(ApiError::unauthorized("Invalid owner identity"));
        }
        Ok(OwnerId(value.to_string()))
    }
}
