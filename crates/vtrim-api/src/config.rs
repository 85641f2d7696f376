//! API configuration.

use std::time::Duration;

/// Largest upload accepted by `POST /api/uploads` (100 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP rate limit for `/api` routes (requests per second)
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Largest accepted upload
    pub max_upload_bytes: u64,
    /// Upload initialisations allowed per owner per hour
    pub uploads_per_hour: u32,
    /// Lifetime of presigned upload URLs
    pub upload_url_ttl: Duration,
    /// Lifetime of result download URLs
    pub result_url_ttl: Duration,
    /// Probe URL sources for their duration before accepting a submission
    pub probe_on_submit: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 1024 * 1024, // 1MB, uploads go straight to the blob store
            max_upload_bytes: MAX_UPLOAD_BYTES,
            uploads_per_hour: 5,
            upload_url_ttl: Duration::from_secs(3600),
            result_url_ttl: Duration::from_secs(3600),
            probe_on_submit: true,
            environment: "development".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            uploads_per_hour: env_parse("UPLOADS_PER_HOUR").unwrap_or(defaults.uploads_per_hour),
            upload_url_ttl: env_parse("UPLOAD_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_url_ttl),
            result_url_ttl: env_parse("RESULT_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_url_ttl),
            probe_on_submit: std::env::var("PROBE_ON_SUBMIT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.probe_on_submit),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
