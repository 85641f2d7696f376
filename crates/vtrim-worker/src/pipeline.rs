//! One job, start to finish: acquire → transform → persist → notify.
//!
//! Progress checkpoints: dequeued 0% (the job becomes active), source
//! acquired 10%, transform 30%-80% (tool progress mapped into the band),
//! persisted 100%.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::Instrument;

use vtrim_media::{
    FractionCallback, MediaToolkit, SourceInput, TransformOutcome, TransformPath, TransformRequest,
    TransformStrategy,
};
use vtrim_models::{Job, JobEvent, JobFailure, JobId, JobState, SourceRef};
use vtrim_queue::EventPublisher;
use vtrim_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::workspace::JobWorkspace;

pub const PCT_ACTIVE: u8 = 0;
pub const PCT_SOURCE_ACQUIRED: u8 = 10;
pub const PCT_TRANSFORM_START: u8 = 30;
pub const PCT_TRANSFORM_DONE: u8 = 80;
pub const PCT_PERSISTED: u8 = 100;

/// What happened to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,
    pub path: Option<TransformPath>,
    pub result_key: Option<String>,
    pub failure: Option<JobFailure>,
}

struct Persisted {
    outcome: TransformOutcome,
    key: String,
    url: Option<String>,
}

/// Runs jobs. Shared by all executors of a pool.
pub struct Pipeline {
    strategy: TransformStrategy<Arc<dyn MediaToolkit>>,
    store: Arc<dyn BlobStore>,
    events: EventPublisher,
    work_dir: PathBuf,
    source_url_ttl: Duration,
    result_url_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        config: &WorkerConfig,
        toolkit: Arc<dyn MediaToolkit>,
        store: Arc<dyn BlobStore>,
        events: EventPublisher,
    ) -> Self {
        Self {
            strategy: TransformStrategy::new(toolkit).with_fallback_ceiling(config.fallback_ceiling_secs),
            store,
            events,
            work_dir: config.work_dir.clone(),
            source_url_ttl: config.source_url_ttl,
            result_url_ttl: config.result_url_ttl,
        }
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Execute `job` and publish its terminal event.
    ///
    /// Never fails: every error ends up in the `failed` event and the report.
    pub async fn process(&self, job: Job) -> JobReport {
        let logger = JobLogger::new(&job, "trim");
        let span = logger.create_span();
        self.process_inner(job, logger).instrument(span).await
    }

    async fn process_inner(&self, job: Job, logger: JobLogger) -> JobReport {
        let started = Instant::now();
        let queue_wait = (Utc::now() - job.enqueued_at).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::record_job_started(job.priority.as_str(), queue_wait);
        logger.log_start(&format!(
            "{} source, {:.1}s range, waited {:.1}s",
            job.payload.source.kind(),
            job.payload.range.duration(),
            queue_wait
        ));

        // Activation is published before any stage I/O.
        self.events
            .publish(&job, JobEvent::progress(job.id.clone(), PCT_ACTIVE))
            .await;

        let result = match JobWorkspace::create(&self.work_dir, &job.id).await {
            Ok(workspace) => {
                let result = self.run(&job, &workspace, &logger).await;
                workspace.cleanup().await;
                result
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(persisted) => {
                let path = persisted.outcome.path;
                metrics::record_job_completed(job.priority.as_str(), path.as_str(), started.elapsed().as_secs_f64());
                logger.log_completion(&format!(
                    "{} via {} path ({} bytes)",
                    persisted.key,
                    path.as_str(),
                    persisted.outcome.size_bytes
                ));
                self.events
                    .publish(&job, JobEvent::completed(job.id.clone(), &persisted.key, persisted.url))
                    .await;
                JobReport {
                    job_id: job.id,
                    state: JobState::Completed,
                    path: Some(path),
                    result_key: Some(persisted.key),
                    failure: None,
                }
            }
            Err(e) => {
                let failure = e.to_failure();
                metrics::record_job_failed(job.priority.as_str(), failure.kind.as_str());
                logger.log_error(&format!("{} ({})", e, failure.kind));
                self.events
                    .publish(&job, JobEvent::failed(job.id.clone(), failure.clone()))
                    .await;
                JobReport {
                    job_id: job.id,
                    state: JobState::Failed,
                    path: None,
                    result_key: None,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn run(&self, job: &Job, workspace: &JobWorkspace, logger: &JobLogger) -> WorkerResult<Persisted> {
        let progress = Progress::new(&self.events, job);

        let stage = Instant::now();
        logger.log_stage("acquire", "Resolving source");
        let source = self.acquire(job).await?;
        metrics::record_stage_duration("acquire", stage.elapsed().as_secs_f64());
        progress.report(PCT_SOURCE_ACQUIRED).await;

        let stage = Instant::now();
        logger.log_stage("transform", "Trimming");
        progress.report(PCT_TRANSFORM_START).await;
        let request = TransformRequest {
            source,
            range: job.payload.range,
            container: job.payload.container,
            resolution: job.payload.resolution,
            work_dir: workspace.path().to_path_buf(),
            output: workspace.file(&format!("output.{}", job.payload.container.extension())),
        };
        let outcome = self.transform(&request, &progress).await?;
        metrics::record_transform_path(outcome.path.as_str());
        metrics::record_stage_duration("transform", stage.elapsed().as_secs_f64());
        progress.report(PCT_TRANSFORM_DONE).await;

        let stage = Instant::now();
        logger.log_stage("persist", "Uploading result");
        let key = job.result_key();
        self.store
            .upload(&outcome.output, &key, job.payload.container.content_type())
            .await?;
        let url = match self.store.presign_download(&key, self.result_url_ttl).await {
            Ok(url) => Some(url),
            Err(e) => {
                logger.log_warning(&format!("Result stored but URL signing failed: {}", e));
                None
            }
        };
        metrics::record_stage_duration("persist", stage.elapsed().as_secs_f64());
        progress.report(PCT_PERSISTED).await;

        Ok(Persisted { outcome, key, url })
    }

    async fn acquire(&self, job: &Job) -> WorkerResult<SourceInput> {
        Ok(match &job.payload.source {
            SourceRef::Url { url } => SourceInput::Remote {
                url: url.clone(),
                format_id: job.payload.format_id.clone(),
            },
            SourceRef::Blob { key } => SourceInput::Blob {
                key: key.clone(),
                signed_url: self.store.presign_download(key, self.source_url_ttl).await?,
            },
        })
    }

    /// Run the strategy, forwarding tool progress into the transform band
    /// from this task so events stay in order.
    async fn transform(&self, request: &TransformRequest, progress: &Progress<'_>) -> WorkerResult<TransformOutcome> {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let on_progress: FractionCallback = Arc::new(move |fraction| {
            let _ = tx.send(band(fraction, PCT_TRANSFORM_START, PCT_TRANSFORM_DONE));
        });

        let execute = self.strategy.execute(request, on_progress);
        tokio::pin!(execute);
        let result = loop {
            tokio::select! {
                biased;
                result = &mut execute => break result,
                Some(pct) = rx.recv() => progress.report(pct).await,
            }
        };
        while let Ok(pct) = rx.try_recv() {
            progress.report(pct).await;
        }
        Ok(result?)
    }
}

/// Map a stage fraction into `[lo, hi]` percent.
fn band(fraction: f64, lo: u8, hi: u8) -> u8 {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    lo + ((hi - lo) as f64 * fraction).round() as u8
}

/// Monotonic progress reporting for one job.
struct Progress<'a> {
    events: &'a EventPublisher,
    job: &'a Job,
    last: AtomicU8,
}

impl<'a> Progress<'a> {
    fn new(events: &'a EventPublisher, job: &'a Job) -> Self {
        Self {
            events,
            job,
            last: AtomicU8::new(0),
        }
    }

    async fn report(&self, pct: u8) {
        let pct = pct.min(100);
        if self.last.fetch_max(pct, Ordering::Relaxed) >= pct {
            return;
        }
        self.events
            .publish(self.job, JobEvent::progress(self.job.id.clone(), pct))
            .await;
    }
}
