//! Application state.

use std::sync::Arc;

use vtrim_models::SubmissionLimits;
use vtrim_queue::{
    EventPublisher, JobQueue, Notifier, ProgressChannel, QueueConfig, RedisJobQueue, RedisStatusStore,
    StatusStore, SubmissionService,
};
use vtrim_storage::{blob_store_from_env, BlobStore};

use crate::config::ApiConfig;
use crate::middleware::OwnerRateLimiter;
use crate::services::{SourceProber, YtDlpProber};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub submissions: SubmissionService,
    pub queue: Arc<dyn JobQueue>,
    pub notifier: Arc<dyn Notifier>,
    pub status: Arc<dyn StatusStore>,
    pub store: Arc<dyn BlobStore>,
    pub prober: Arc<dyn SourceProber>,
    pub upload_limiter: Arc<OwnerRateLimiter>,
}

/// Backends the API talks to.
pub struct Backends {
    pub queue: Arc<dyn JobQueue>,
    pub notifier: Arc<dyn Notifier>,
    pub status: Arc<dyn StatusStore>,
    pub store: Arc<dyn BlobStore>,
    pub prober: Arc<dyn SourceProber>,
}

impl AppState {
    pub fn new(config: ApiConfig, limits: SubmissionLimits, backends: Backends) -> Self {
        let events = EventPublisher::new(Arc::clone(&backends.notifier), Arc::clone(&backends.status));
        let submissions = SubmissionService::new(Arc::clone(&backends.queue), events, limits);
        let upload_limiter = Arc::new(OwnerRateLimiter::per_hour(config.uploads_per_hour));
        Self {
            config,
            submissions,
            queue: backends.queue,
            notifier: backends.notifier,
            status: backends.status,
            store: backends.store,
            prober: backends.prober,
            upload_limiter,
        }
    }

    /// Create application state from environment variables.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let queue_config = QueueConfig::from_env();
        let status_ttl = queue_config.status_ttl;
        let redis_url = queue_config.redis_url.clone();

        let queue = RedisJobQueue::new(queue_config)?;
        queue.ping().await?;

        let backends = Backends {
            queue: Arc::new(queue),
            notifier: Arc::new(ProgressChannel::new(&redis_url)?),
            status: Arc::new(RedisStatusStore::new(&redis_url, status_ttl)?),
            store: blob_store_from_env()?,
            prober: Arc::new(YtDlpProber::from_env()),
        };
        Ok(Self::new(config, SubmissionLimits::from_env(), backends))
    }
}
