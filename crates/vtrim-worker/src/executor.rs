//! Worker pool.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use vtrim_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::Pipeline;

/// N executors pulling from one queue.
///
/// Each executor runs one job at a time. Job failures are reported and the
/// loop continues; a queue error ends the pool, since without the broker
/// there is nothing left to do.
pub struct WorkerPool {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<Pipeline>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobQueue>, pipeline: Arc<Pipeline>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            pipeline,
            shutdown,
        }
    }

    /// Stop dequeuing; in-flight jobs get `shutdown_timeout` to finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until shutdown or a broker failure.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting worker pool with {} executor(s), work dir {}",
            self.config.concurrency,
            self.config.work_dir.display()
        );

        let mut executors = JoinSet::new();
        for index in 0..self.config.concurrency.max(1) {
            executors.spawn(executor_loop(
                index,
                Arc::clone(&self.queue),
                Arc::clone(&self.pipeline),
                self.config.dequeue_wait,
                self.shutdown.subscribe(),
            ));
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut fatal = None;
        loop {
            tokio::select! {
                joined = executors.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        error!("Executor stopped: {}", e);
                        fatal = Some(e);
                        self.shutdown();
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Executor panicked: {}", e);
                        fatal = Some(WorkerError::internal(format!("executor panicked: {e}")));
                        self.shutdown();
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executors");
                        break;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(joined) = executors.join_next().await {
                if let Ok(Err(e)) = joined {
                    warn!("Executor stopped during shutdown: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "In-flight jobs still running after {:?}; aborting",
                self.config.shutdown_timeout
            );
            executors.shutdown().await;
        }

        info!("Worker pool stopped");
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn executor_loop(
    index: usize,
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<Pipeline>,
    dequeue_wait: std::time::Duration,
    shutdown: watch::Receiver<bool>,
) -> WorkerResult<()> {
    debug!(executor = index, "Executor started");
    // Shutdown is only checked between dequeues so a popped job is never lost.
    while !*shutdown.borrow() {
        let job = match queue.dequeue_next(dequeue_wait).await {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                error!(executor = index, broker = e.is_broker_failure(), "Dequeue failed: {}", e);
                return Err(e.into());
            }
        };

        let report = pipeline.process(job).await;
        debug!(
            executor = index,
            job_id = %report.job_id,
            state = %report.state,
            "Executor finished job"
        );
    }
    debug!(executor = index, "Executor stopped");
    Ok(())
}
