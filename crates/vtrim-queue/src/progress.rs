//! Lifecycle event delivery to the submitting connection.
//!
//! Delivery is best-effort and at most once: an event published while the
//! owner's socket is gone is dropped, never buffered for later.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::debug;

use vtrim_models::{JobEvent, OwnerConnection};

use crate::error::{QueueError, QueueResult};

/// Stream of events for one connection.
pub type EventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Outcome of a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to this many live subscribers
    Delivered(usize),
    /// Nobody was listening
    Dropped,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered(_))
    }
}

/// Pushes job events to the connection that submitted the job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner: &OwnerConnection, event: &JobEvent) -> QueueResult<Delivery>;

    /// Events addressed to `connection_id` from now on.
    async fn subscribe(&self, connection_id: &str) -> QueueResult<EventStream>;
}

/// Redis Pub/Sub notifier; one channel per connection.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a connection.
    pub fn channel_name(connection_id: &str) -> String {
        format!("vtrim:conn:{}", connection_id)
    }
}

#[async_trait]
impl Notifier for ProgressChannel {
    async fn notify(&self, owner: &OwnerConnection, event: &JobEvent) -> QueueResult<Delivery> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        let channel = Self::channel_name(&owner.connection_id);
        let payload = serde_json::to_string(event)?;

        debug!(job_id = %event.job_id(), event = event.type_str(), "Publishing to {}", channel);
        let receivers: usize = conn.publish(channel, payload).await?;

        Ok(match receivers {
            0 => Delivery::Dropped,
            n => Delivery::Delivered(n),
        })
    }

    async fn subscribe(&self, connection_id: &str) -> QueueResult<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(connection_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

/// In-process connection registry.
#[derive(Default)]
pub struct MemoryNotifier {
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<JobEvent>>>,
    dropped: AtomicU64,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> QueueResult<MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<JobEvent>>>> {
        self.connections
            .lock()
            .map_err(|_| QueueError::connection_failed("notifier registry lock poisoned"))
    }

    /// Register a connection and receive its events directly.
    pub fn register(&self, connection_id: &str) -> QueueResult<mpsc::UnboundedReceiver<JobEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections()?.insert(connection_id.to_string(), tx);
        Ok(rx)
    }

    /// Forget a connection; later events for it are dropped.
    pub fn disconnect(&self, connection_id: &str) {
        if let Ok(mut connections) = self.connections() {
            connections.remove(connection_id);
        }
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections()
            .map(|c| c.contains_key(connection_id))
            .unwrap_or(false)
    }

    /// Events dropped because their connection was gone.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, owner: &OwnerConnection, event: &JobEvent) -> QueueResult<Delivery> {
        let mut connections = self.connections()?;
        let sent = match connections.get(&owner.connection_id) {
            Some(tx) => tx.send(event.clone()).is_ok(),
            None => false,
        };
        if sent {
            return Ok(Delivery::Delivered(1));
        }

        // Receiver went away without disconnecting.
        connections.remove(&owner.connection_id);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        Ok(Delivery::Dropped)
    }

    async fn subscribe(&self, connection_id: &str) -> QueueResult<EventStream> {
        let rx = self.register(connection_id)?;
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        });
        Ok(Box::pin(stream))
    }
}
