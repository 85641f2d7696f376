//! End-to-end pipeline runs over in-memory queue/notifier backends, the
//! filesystem blob store and a scripted media toolkit.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

use vtrim_media::{FractionCallback, MediaError, MediaResult, MediaToolkit, SourceInput, TranscodeSpec};
use vtrim_models::{
    Container, FailureKind, Job, JobEvent, JobId, JobState, JobStatusSnapshot, OwnerConnection, Priority,
    SourceRef, SubmissionLimits, SubmitRequest, TimeValue, TrimRange,
};
use vtrim_queue::{
    EventPublisher, JobQueue, MemoryJobQueue, MemoryNotifier, MemoryStatusStore, QueueError, QueueResult,
    StatusStore, SubmissionService,
};
use vtrim_storage::{BlobStore, FsBlobStore};
use vtrim_worker::{Pipeline, WorkerConfig, WorkerError, WorkerPool};

#[derive(Default)]
struct ScriptedToolkit {
    smart_fails: bool,
    transcode_fails: bool,
    /// Holds `smart_trim` until notified.
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedToolkit {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaToolkit for ScriptedToolkit {
    async fn smart_trim(
        &self,
        _source: &SourceInput,
        range: TrimRange,
        _container: Container,
        work_dir: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.record(format!("smart:{}-{}", range.start(), range.end()));
        tokio::fs::write(work_dir.join("segment.mkv"), b"partial").await?;
        if self.smart_fails {
            return Err(MediaError::SourceUnavailable("HTTP Error 403: Forbidden".into()));
        }
        tokio::fs::write(output, b"trimmed").await?;
        Ok(())
    }

    async fn download_full(&self, _source: &SourceInput, work_dir: &Path) -> MediaResult<PathBuf> {
        self.record("download".into());
        let path = work_dir.join("source.mkv");
        tokio::fs::write(&path, b"full source").await?;
        Ok(path)
    }

    async fn transcode(&self, spec: &TranscodeSpec, on_progress: FractionCallback) -> MediaResult<()> {
        self.record("transcode".into());
        for fraction in [0.25, 0.5, 0.75] {
            on_progress(fraction);
        }
        if self.transcode_fails {
            tokio::fs::write(&spec.output, b"").await?;
            return Err(MediaError::process_failed("ffmpeg", "Conversion failed!", None, Some(1)));
        }
        tokio::fs::write(&spec.output, b"transcoded").await?;
        Ok(())
    }
}

struct Harness {
    work: TempDir,
    _blobs: TempDir,
    queue: Arc<MemoryJobQueue>,
    notifier: Arc<MemoryNotifier>,
    status: Arc<MemoryStatusStore>,
    store: Arc<FsBlobStore>,
    toolkit: Arc<ScriptedToolkit>,
    submissions: SubmissionService,
    pipeline: Arc<Pipeline>,
    config: WorkerConfig,
}

impl Harness {
    fn new(toolkit: ScriptedToolkit) -> Self {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        let queue = Arc::new(MemoryJobQueue::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let status = Arc::new(MemoryStatusStore::new());
        let store = Arc::new(FsBlobStore::new(blobs.path()));
        let toolkit = Arc::new(toolkit);
        let events = EventPublisher::new(notifier.clone(), status.clone());

        let config = WorkerConfig {
            work_dir: work.path().to_path_buf(),
            dequeue_wait: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        };
        let submissions = SubmissionService::new(queue.clone(), events.clone(), SubmissionLimits::default());
        let pipeline = Arc::new(Pipeline::new(&config, toolkit.clone(), store.clone(), events));

        Self {
            work,
            _blobs: blobs,
            queue,
            notifier,
            status,
            store,
            toolkit,
            submissions,
            pipeline,
            config,
        }
    }

    async fn submit(&self, start: f64, end: f64, connection: &str) -> QueueResult<Job> {
        self.submissions
            .submit(request(start, end), OwnerConnection::new("user-1", connection), None)
            .await
    }

    async fn next_job(&self) -> Job {
        self.queue.dequeue_next(Duration::ZERO).await.unwrap().unwrap()
    }

    fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work.path()).unwrap().next().is_none()
    }
}

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

fn drain(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_values(events: &[JobEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { pct, .. } => Some(*pct),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn scenario_a_valid_url_completes_with_result() {
    let h = Harness::new(ScriptedToolkit::default());
    let mut rx = h.notifier.register("conn-a").unwrap();

    let job = h.submit(0.0, 10.0, "conn-a").await.unwrap();
    assert_eq!(job.priority, Priority::Express);

    let report = h.pipeline.process(h.next_job().await).await;
    assert_eq!(report.state, JobState::Completed);

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&JobEvent::queued(job.id.clone(), Priority::Express)));
    match events.last() {
        Some(JobEvent::Completed { result_ref, url, .. }) => {
            assert_eq!(result_ref, &format!("processed/{}.mp4", job.id));
            assert!(url.is_some());
        }
        other => panic!("expected completed, got {:?}", other),
    }

    let pct = progress_values(&events);
    assert_eq!(pct, vec![0, 10, 30, 80, 100]);

    let stored = h.store.list("processed/").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(h.toolkit.calls(), vec!["smart:0-10"]);
    assert!(h.work_dir_is_empty());

    let snapshot = h.status.get(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.progress, 100);
}

#[tokio::test]
async fn scenario_b_inverted_range_is_rejected_synchronously() {
    let h = Harness::new(ScriptedToolkit::default());
    let mut rx = h.notifier.register("conn-b").unwrap();

    let err = h.submit(20.0, 10.0, "conn-b").await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
    assert_eq!(err.kind(), FailureKind::Validation);

    for priority in Priority::ALL {
        assert_eq!(h.queue.len(priority).await.unwrap(), 0);
    }
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn scenario_c_smart_failure_falls_back_within_ceiling() {
    let h = Harness::new(ScriptedToolkit {
        smart_fails: true,
        ..Default::default()
    });
    let mut rx = h.notifier.register("conn-c").unwrap();

    h.submit(0.0, 120.0, "conn-c").await.unwrap();
    let report = h.pipeline.process(h.next_job().await).await;

    assert_eq!(report.state, JobState::Completed);
    assert_eq!(report.path, Some(vtrim_media::TransformPath::Fallback));
    assert_eq!(h.toolkit.calls(), vec!["smart:0-120", "download", "transcode"]);

    let events = drain(&mut rx);
    let pct = progress_values(&events);
    assert!(pct.windows(2).all(|w| w[0] < w[1]), "progress must increase: {:?}", pct);
    assert!(pct.iter().any(|p| *p > 30 && *p < 80), "tool progress mapped into band: {:?}", pct);
    assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn scenario_d_over_ceiling_fails_without_fallback() {
    let h = Harness::new(ScriptedToolkit {
        smart_fails: true,
        ..Default::default()
    });
    let mut rx = h.notifier.register("conn-d").unwrap();

    let job = h.submit(0.0, 2000.0, "conn-d").await.unwrap();
    assert_eq!(job.priority, Priority::Standard);

    let report = h.pipeline.process(h.next_job().await).await;
    assert_eq!(report.state, JobState::Failed);
    assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::DurationTooLong);

    let calls = h.toolkit.calls();
    assert_eq!(calls, vec!["smart:0-2000"]);
    assert!(!calls.iter().any(|c| c == "download" || c == "transcode"));

    match drain(&mut rx).last() {
        Some(JobEvent::Failed { reason, message, .. }) => {
            assert_eq!(*reason, FailureKind::DurationTooLong);
            assert!(!message.contains('\n'));
        }
        other => panic!("expected failed, got {:?}", other),
    }
    assert!(h.store.list("processed/").await.unwrap().is_empty());
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn scenario_e_disconnected_owner_still_completes() {
    let h = Harness::new(ScriptedToolkit::default());
    let mut rx = h.notifier.register("conn-e").unwrap();

    let job = h.submit(0.0, 10.0, "conn-e").await.unwrap();
    assert!(matches!(rx.recv().await, Some(JobEvent::Queued { .. })));
    h.notifier.disconnect("conn-e");

    let report = h.pipeline.process(h.next_job().await).await;
    assert_eq!(report.state, JobState::Completed);
    assert!(h.notifier.dropped_count() > 0);
    assert!(h.work_dir_is_empty());

    // status polling still sees the outcome
    let snapshot = h.status.get(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
}

#[tokio::test]
async fn transcode_failure_cleans_up_and_reports_terse_message() {
    let h = Harness::new(ScriptedToolkit {
        smart_fails: true,
        transcode_fails: true,
        ..Default::default()
    });

    h.submit(0.0, 60.0, "conn-f").await.unwrap();
    let report = h.pipeline.process(h.next_job().await).await;

    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::TranscodeFailed);
    assert_eq!(failure.message, "ffmpeg exited with status 1");
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn pool_drains_express_before_standard() {
    let h = Harness::new(ScriptedToolkit::default());

    h.submit(0.0, 600.0, "conn-p").await.unwrap();
    h.submit(0.0, 900.0, "conn-p").await.unwrap();
    h.submit(0.0, 10.0, "conn-p").await.unwrap();

    let pool = Arc::new(WorkerPool::new(h.config.clone(), h.queue.clone(), h.pipeline.clone()));
    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run().await })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if h.toolkit.calls().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("jobs processed");

    pool.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(h.toolkit.calls(), vec!["smart:0-10", "smart:0-600", "smart:0-900"]);
    assert!(h.work_dir_is_empty());
}

struct BrokenQueue;

#[async_trait]
impl JobQueue for BrokenQueue {
    async fn push(&self, _job: &Job) -> QueueResult<()> {
        Err(QueueError::connection_failed("connection refused"))
    }

    async fn dequeue_next(&self, _wait: Duration) -> QueueResult<Option<Job>> {
        Err(QueueError::connection_failed("connection reset by peer"))
    }

    async fn len(&self, _priority: Priority) -> QueueResult<u64> {
        Ok(0)
    }
}

#[tokio::test]
async fn broker_failure_stops_the_pool() {
    let h = Harness::new(ScriptedToolkit::default());
    let pool = WorkerPool::new(h.config.clone(), Arc::new(BrokenQueue), h.pipeline.clone());

    let result = tokio::time::timeout(Duration::from_secs(5), pool.run())
        .await
        .expect("pool exits");
    assert!(matches!(result, Err(WorkerError::Queue(e)) if e.is_broker_failure()));
}

/// Status store with a slow read, like a remote broker round trip.
struct SlowStatusStore(Arc<MemoryStatusStore>);

#[async_trait]
impl StatusStore for SlowStatusStore {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.get(job_id).await
    }

    async fn put(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        self.0.put(snapshot).await
    }

    async fn put_if_absent(&self, snapshot: &JobStatusSnapshot) -> QueueResult<bool> {
        self.0.put_if_absent(snapshot).await
    }
}

#[tokio::test]
async fn queued_reaches_owner_before_worker_events() {
    let h = Harness::new(ScriptedToolkit::default());
    let mut rx = h.notifier.register("conn-q").unwrap();
    let api_events = EventPublisher::new(h.notifier.clone(), Arc::new(SlowStatusStore(h.status.clone())));
    let submissions = SubmissionService::new(h.queue.clone(), api_events, SubmissionLimits::default());

    let pool = Arc::new(WorkerPool::new(h.config.clone(), h.queue.clone(), h.pipeline.clone()));
    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run().await })
    };
    tokio::task::yield_now().await;

    let job = submissions
        .submit(request(0.0, 10.0), OwnerConnection::new("user-1", "conn-q"), None)
        .await
        .unwrap();

    let mut types = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            types.push(event.type_str());
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("job finished");

    pool.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(types.first(), Some(&"queued"));
    assert_eq!(types.last(), Some(&"completed"));
    assert_eq!(types.iter().filter(|t| **t == "queued").count(), 1);
    let snapshot = h.status.get(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
}

#[tokio::test]
async fn job_is_active_as_soon_as_it_is_dequeued() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(ScriptedToolkit {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let mut rx = h.notifier.register("conn-g").unwrap();

    let job = h.submit(0.0, 10.0, "conn-g").await.unwrap();
    assert!(matches!(rx.recv().await, Some(JobEvent::Queued { .. })));
    assert_eq!(h.status.get(&job.id).await.unwrap().unwrap().state, JobState::Queued);

    let dequeued = h.next_job().await;
    let pipeline = h.pipeline.clone();
    let running = tokio::spawn(async move { pipeline.process(dequeued).await });

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("activation event")
        .unwrap();
    assert_eq!(first, JobEvent::progress(job.id.clone(), 0));
    assert_eq!(h.status.get(&job.id).await.unwrap().unwrap().state, JobState::Active);
    assert!(h.toolkit.calls().is_empty());

    gate.notify_one();
    let report = running.await.unwrap();
    assert_eq!(report.state, JobState::Completed);
}
