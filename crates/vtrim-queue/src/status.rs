//! Short-lived job status snapshots.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use vtrim_models::{JobId, JobStatusSnapshot};

use crate::error::{QueueError, QueueResult};

/// Default snapshot lifetime (2 hours).
pub const JOB_STATUS_TTL_SECS: u64 = 7200;

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>>;

    /// Overwrite the snapshot.
    async fn put(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()>;

    /// Store only if no snapshot exists yet; returns whether it was stored.
    async fn put_if_absent(&self, snapshot: &JobStatusSnapshot) -> QueueResult<bool>;
}

pub struct RedisStatusStore {
    client: redis::Client,
    ttl: Duration,
}

impl RedisStatusStore {
    pub fn new(redis_url: &str, ttl: Duration) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, ttl })
    }

    pub fn key(job_id: &JobId) -> String {
        format!("vtrim:status:{}", job_id)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(Self::key(job_id)).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(Into::into)
    }

    async fn put(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(snapshot)?;
        conn.set_ex::<_, _, ()>(Self::key(&snapshot.job_id), payload, self.ttl_secs())
            .await?;
        Ok(())
    }

    async fn put_if_absent(&self, snapshot: &JobStatusSnapshot) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(snapshot)?;
        let stored: Option<String> = redis::cmd("SET")
            .arg(Self::key(&snapshot.job_id))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await?;
        Ok(stored.is_some())
    }
}

/// In-process snapshots. Entries live as long as the store.
#[derive(Default)]
pub struct MemoryStatusStore {
    snapshots: Mutex<HashMap<JobId, JobStatusSnapshot>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshots(&self) -> QueueResult<std::sync::MutexGuard<'_, HashMap<JobId, JobStatusSnapshot>>> {
        self.snapshots
            .lock()
            .map_err(|_| QueueError::connection_failed("status store lock poisoned"))
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        Ok(self.snapshots()?.get(job_id).cloned())
    }

    async fn put(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        self.snapshots()?
            .insert(snapshot.job_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn put_if_absent(&self, snapshot: &JobStatusSnapshot) -> QueueResult<bool> {
        let mut snapshots = self.snapshots()?;
        if snapshots.contains_key(&snapshot.job_id) {
            return Ok(false);
        }
        snapshots.insert(snapshot.job_id.clone(), snapshot.clone());
        Ok(true)
    }
}
