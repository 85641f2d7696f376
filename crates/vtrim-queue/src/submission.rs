//! Submission service: validate, announce, enqueue.

use std::sync::Arc;

use tracing::{error, info, warn};

use vtrim_models::{FailureKind, Job, JobEvent, JobFailure, OwnerConnection, SubmissionLimits, SubmitRequest};

use crate::error::QueueResult;
use crate::publisher::EventPublisher;
use crate::queue::JobQueue;

#[derive(Clone)]
pub struct SubmissionService {
    queue: Arc<dyn JobQueue>,
    events: EventPublisher,
    limits: SubmissionLimits,
}

impl SubmissionService {
    pub fn new(queue: Arc<dyn JobQueue>, events: EventPublisher, limits: SubmissionLimits) -> Self {
        Self { queue, events, limits }
    }

    pub fn limits(&self) -> &SubmissionLimits {
        &self.limits
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Validate a request, emit `queued` to its owner, then enqueue it.
    ///
    /// `queued` goes out before the job is visible to workers, so it always
    /// precedes the job's progress events. Rejected requests return
    /// [`crate::QueueError::Validation`] and never reach the queue.
    pub async fn submit(
        &self,
        request: SubmitRequest,
        owner: OwnerConnection,
        source_duration: Option<f64>,
    ) -> QueueResult<Job> {
        let descriptor = match request.into_descriptor(owner, &self.limits, source_duration) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Submission rejected: {}", e);
                return Err(e.into());
            }
        };

        let job = descriptor.into_job();
        self.events
            .publish(&job, JobEvent::queued(job.id.clone(), job.priority))
            .await;

        if let Err(e) = self.queue.push(&job).await {
            error!(job_id = %job.id, "Failed to enqueue job: {}", e);
            let failure = JobFailure::new(FailureKind::InternalFault, "Job could not be queued");
            self.events.publish(&job, JobEvent::failed(job.id.clone(), failure)).await;
            return Err(e);
        }

        info!(
            job_id = %job.id,
            priority = %job.priority,
            duration_secs = job.payload.range.duration(),
            source = job.payload.source.kind(),
            "Job submitted"
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::progress::MemoryNotifier;
    use crate::queue::MemoryJobQueue;
    use crate::status::{MemoryStatusStore, StatusStore};
    use std::time::Duration;
    use vtrim_models::{JobState, Priority, SourceRef, TimeValue, ValidationError};

    fn request(start: f64, end: f64) -> SubmitRequest {
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
    }

    fn service() -> (SubmissionService, Arc<MemoryJobQueue>, Arc<MemoryNotifier>, Arc<MemoryStatusStore>) {
        let queue = Arc::new(MemoryJobQueue::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let status = Arc::new(MemoryStatusStore::new());
        let events = EventPublisher::new(notifier.clone(), status.clone());
        let service = SubmissionService::new(queue.clone(), events, SubmissionLimits::default());
        (service, queue, notifier, status)
    }

    #[tokio::test]
    async fn test_valid_submission_is_queued_and_announced() {
        let (service, queue, notifier, status) = service();
        let mut rx = notifier.register("conn-1").unwrap();

        let job = service
            .submit(request(0.0, 10.0), OwnerConnection::new("user-1", "conn-1"), None)
            .await
            .unwrap();

        assert_eq!(job.priority, Priority::Express);
        assert_eq!(queue.len(Priority::Express).await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), JobEvent::queued(job.id.clone(), Priority::Express));
        assert_eq!(status.get(&job.id).await.unwrap().unwrap().state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_long_clip_goes_to_standard_lane() {
        let (service, queue, _, _) = service();
        let job = service
            .submit(request(0.0, 301.0), OwnerConnection::new("user-1", "conn-1"), None)
            .await
            .unwrap();
        assert_eq!(job.priority, Priority::Standard);
        assert_eq!(queue.len(Priority::Standard).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejection_creates_no_entry() {
        let (service, queue, notifier, _) = service();
        let mut rx = notifier.register("conn-1").unwrap();

        let err = service
            .submit(request(20.0, 10.0), OwnerConnection::new("user-1", "conn-1"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            QueueError::Validation(ValidationError::InvalidRange { .. })
        ));
        for priority in Priority::ALL {
            assert_eq!(queue.len(priority).await.unwrap(), 0);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_range_past_known_source_duration_is_rejected() {
        let (service, queue, _, _) = service();
        let err = service
            .submit(request(0.0, 120.0), OwnerConnection::new("user-1", "conn-1"), Some(60.0))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(ValidationError::OutOfSource { .. })));
        assert_eq!(queue.len(Priority::Express).await.unwrap(), 0);
    }

    struct UnreachableQueue;

    #[async_trait::async_trait]
    impl JobQueue for UnreachableQueue {
        async fn push(&self, _job: &Job) -> QueueResult<()> {
            Err(QueueError::connection_failed("connection refused"))
        }

        async fn dequeue_next(&self, _wait: Duration) -> QueueResult<Option<Job>> {
            Ok(None)
        }

        async fn len(&self, _priority: Priority) -> QueueResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_queued_is_announced_before_job_is_visible() {
        let (service, queue, notifier, _) = service();
        let mut rx = notifier.register("conn-1").unwrap();

        let job = service
            .submit(request(0.0, 10.0), OwnerConnection::new("user-1", "conn-1"), None)
            .await
            .unwrap();

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued, JobEvent::queued(job.id.clone(), Priority::Express));
        assert_eq!(queue.dequeue_next(Duration::ZERO).await.unwrap().unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_enqueue_failure_marks_snapshot_failed() {
        let notifier = Arc::new(MemoryNotifier::new());
        let status = Arc::new(MemoryStatusStore::new());
        let events = EventPublisher::new(notifier.clone(), status.clone());
        let service = SubmissionService::new(Arc::new(UnreachableQueue), events, SubmissionLimits::default());
        let mut rx = notifier.register("conn-1").unwrap();

        let err = service
            .submit(request(0.0, 10.0), OwnerConnection::new("user-1", "conn-1"), None)
            .await
            .unwrap_err();
        assert!(err.is_broker_failure());

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.type_str(), "queued");
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.type_str(), "failed");

        let snapshot = status.get(queued.job_id()).await.unwrap().unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.failure.unwrap().kind, FailureKind::InternalFault);
    }
}
