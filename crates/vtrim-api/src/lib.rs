//! Axum HTTP/WS API server.
//!
//! This crate provides:
//! - Trim submission over HTTP and over the status socket
//! - Per-connection lifecycle event delivery
//! - Job status polling and signed result URLs
//! - Upload initialisation and source metadata lookup
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod ws;

pub use auth::OwnerId;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{SourceProber, YtDlpProber};
pub use state::{AppState, Backends};
