//! Fan-out of lifecycle events to the owner's socket and the status snapshot.

use std::sync::Arc;

use tracing::{debug, warn};

use vtrim_models::{Job, JobEvent, JobStatusSnapshot};

use crate::error::QueueResult;
use crate::progress::{Delivery, Notifier};
use crate::status::StatusStore;

/// Publishes job events without ever failing the caller.
///
/// Notifier and status store errors are logged and swallowed; the pipeline
/// outcome does not depend on anyone listening.
#[derive(Clone)]
pub struct EventPublisher {
    notifier: Arc<dyn Notifier>,
    status: Arc<dyn StatusStore>,
}

impl EventPublisher {
    pub fn new(notifier: Arc<dyn Notifier>, status: Arc<dyn StatusStore>) -> Self {
        Self { notifier, status }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn status(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    /// Record `event` in the job's snapshot, then push it to the owner.
    pub async fn publish(&self, job: &Job, event: JobEvent) -> Delivery {
        if let Err(e) = self.record(job, &event).await {
            warn!(job_id = %job.id, event = event.type_str(), "Failed to update job status: {}", e);
        }

        match self.notifier.notify(&job.owner, &event).await {
            Ok(Delivery::Dropped) => {
                debug!(
                    job_id = %job.id,
                    event = event.type_str(),
                    connection_id = %job.owner.connection_id,
                    "Owner not connected; event dropped"
                );
                Delivery::Dropped
            }
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(job_id = %job.id, event = event.type_str(), "Failed to notify owner: {}", e);
                Delivery::Dropped
            }
        }
    }

    async fn record(&self, job: &Job, event: &JobEvent) -> QueueResult<()> {
        match self.status.get(&job.id).await? {
            Some(mut snapshot) => {
                if snapshot.apply(event) {
                    self.status.put(&snapshot).await?;
                }
            }
            None => {
                let mut snapshot = JobStatusSnapshot::queued(job.id.clone(), &job.owner.owner_id, job.priority);
                snapshot.apply(event);
                self.status.put_if_absent(&snapshot).await?;
            }
        }
        Ok(())
    }
}
