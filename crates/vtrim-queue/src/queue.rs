//! Two-lane job queue.
//!
//! Express jobs always drain before standard ones; each lane is FIFO.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vtrim_models::{Job, JobDescriptor, Priority};

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List holding express jobs
    pub express_key: String,
    /// List holding standard jobs
    pub standard_key: String,
    /// Lifetime of job status snapshots
    pub status_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            express_key: "vtrim:queue:express".to_string(),
            standard_key: "vtrim:queue:standard".to_string(),
            status_ttl: Duration::from_secs(crate::status::JOB_STATUS_TTL_SECS),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            express_key: std::env::var("QUEUE_EXPRESS_KEY").unwrap_or(defaults.express_key),
            standard_key: std::env::var("QUEUE_STANDARD_KEY").unwrap_or(defaults.standard_key),
            status_ttl: std::env::var("JOB_STATUS_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_ttl),
        }
    }

    /// List key for a lane.
    pub fn lane_key(&self, priority: Priority) -> &str {
        match priority {
            Priority::Express => &self.express_key,
            Priority::Standard => &self.standard_key,
        }
    }
}

/// Broker boundary between submission and the worker pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an already built job to its lane.
    async fn push(&self, job: &Job) -> QueueResult<()>;

    /// Assign an id and append the job to its lane.
    async fn enqueue(&self, descriptor: JobDescriptor) -> QueueResult<Job> {
        let job = descriptor.into_job();
        self.push(&job).await?;
        Ok(job)
    }

    /// Wait up to `wait` for the next job, express lane first.
    async fn dequeue_next(&self, wait: Duration) -> QueueResult<Option<Job>>;

    /// Number of jobs waiting in a lane.
    async fn len(&self, priority: Priority) -> QueueResult<u64>;

    /// Broker reachability for readiness probes.
    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Redis list backend.
///
/// Jobs are `LPUSH`ed and popped with a single multi-key `BRPOP`, which
/// checks the express list before the standard one on every call.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn decode(lane: &str, payload: &str) -> Option<Job> {
        match serde_json::from_str::<Job>(payload) {
            Ok(job) => Some(job),
            Err(e) => {
                // Popped already; nothing to put back.
                warn!(lane = lane, "Dropping malformed job payload: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: &Job) -> QueueResult<()> {
        let payload = serde_json::to_string(job)?;
        let key = self.config.lane_key(job.priority);

        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(key, payload)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(job_id = %job.id, priority = %job.priority, "Enqueued job");
        Ok(())
    }

    async fn dequeue_next(&self, wait: Duration) -> QueueResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let keys = [self.config.express_key.as_str(), self.config.standard_key.as_str()];

        if wait.is_zero() {
            for key in keys {
                let popped: Option<String> = conn
                    .rpop(key, None)
                    .await
                    .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;
                if let Some(payload) = popped {
                    return Ok(Self::decode(key, &payload));
                }
            }
            return Ok(None);
        }

        let popped: Option<(String, String)> = conn
            .brpop(&keys, wait.as_secs_f64())
            .await
            .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;

        Ok(popped.and_then(|(lane, payload)| {
            let job = Self::decode(&lane, &payload)?;
            debug!(job_id = %job.id, lane = %lane, "Dequeued job");
            Some(job)
        }))
    }

    async fn len(&self, priority: Priority) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.llen(self.config.lane_key(priority)).await?;
        Ok(len)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Default)]
struct Lanes {
    express: VecDeque<Job>,
    standard: VecDeque<Job>,
}

impl Lanes {
    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<Job> {
        match priority {
            Priority::Express => &mut self.express,
            Priority::Standard => &mut self.standard,
        }
    }

    fn pop(&mut self) -> Option<Job> {
        self.express.pop_front().or_else(|| self.standard.pop_front())
    }
}

/// In-process backend for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryJobQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lanes(&self) -> QueueResult<std::sync::MutexGuard<'_, Lanes>> {
        self.lanes
            .lock()
            .map_err(|_| QueueError::dequeue_failed("queue lock poisoned"))
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: &Job) -> QueueResult<()> {
        self.lanes()?.lane_mut(job.priority).push_back(job.clone());
        self.notify.notify_one();
        debug!(job_id = %job.id, priority = %job.priority, "Enqueued job");
        Ok(())
    }

    async fn dequeue_next(&self, wait: Duration) -> QueueResult<Option<Job>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.lanes()?.pop();
            if next.is_some() {
                return Ok(next);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, priority: Priority) -> QueueResult<u64> {
        Ok(self.lanes()?.lane_mut(priority).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vtrim_models::{OwnerConnection, SourceRef, SubmissionLimits, SubmitRequest, TimeValue};

    fn descriptor(start: f64, end: f64) -> JobDescriptor {
        SubmitRequest {
            source: SourceRef::Url {
                url: "https://example.com/watch?v=abc".into(),
            },
            format_id: "best".into(),
            start: TimeValue::Seconds(start),
            end: TimeValue::Seconds(end),
            container: None,
            resolution: None,
        }
        .into_descriptor(OwnerConnection::new("user-1", "conn-1"), &SubmissionLimits::default(), None)
        .unwrap()
    }

    #[tokio::test]
    async fn test_express_drains_first() {
        let queue = MemoryJobQueue::new();
        let s1 = queue.enqueue(descriptor(0.0, 600.0)).await.unwrap();
        let e1 = queue.enqueue(descriptor(0.0, 10.0)).await.unwrap();
        let s2 = queue.enqueue(descriptor(0.0, 900.0)).await.unwrap();
        let e2 = queue.enqueue(descriptor(0.0, 300.0)).await.unwrap();

        assert_eq!(queue.len(Priority::Express).await.unwrap(), 2);
        assert_eq!(queue.len(Priority::Standard).await.unwrap(), 2);

        let order: Vec<_> = [
            queue.dequeue_next(Duration::ZERO).await.unwrap(),
            queue.dequeue_next(Duration::ZERO).await.unwrap(),
            queue.dequeue_next(Duration::ZERO).await.unwrap(),
            queue.dequeue_next(Duration::ZERO).await.unwrap(),
        ]
        .into_iter()
        .map(|j| j.unwrap().id)
        .collect();
        assert_eq!(order, vec![e1.id, e2.id, s1.id, s2.id]);
        assert!(queue.dequeue_next(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_assigns_unique_ids() {
        let queue = MemoryJobQueue::new();
        let a = queue.enqueue(descriptor(0.0, 10.0)).await.unwrap();
        let b = queue.enqueue(descriptor(0.0, 10.0)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.is_well_formed());
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = MemoryJobQueue::new();
        let got = queue.dequeue_next(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(MemoryJobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_next(Duration::from_secs(10)).await })
        };
        tokio::task::yield_now().await;

        let job = queue.enqueue(descriptor(0.0, 10.0)).await.unwrap();
        let got = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(got.id, job.id);
    }

    #[test]
    fn test_lane_keys() {
        let config = QueueConfig::default();
        assert_eq!(config.lane_key(Priority::Express), "vtrim:queue:express");
        assert_eq!(config.lane_key(Priority::Standard), "vtrim:queue:standard");
    }
}
