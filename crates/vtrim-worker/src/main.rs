//! Trim worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vtrim_media::{check_ffmpeg, check_ytdlp, CliToolkit, ProcessRunner, YtDlpOptions};
use vtrim_queue::{EventPublisher, JobQueue, ProgressChannel, QueueConfig, RedisJobQueue, RedisStatusStore};
use vtrim_worker::{metrics, Pipeline, Reaper, ReaperConfig, StoreFetcher, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vtrim=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vtrim-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    if let Err(e) = check_ffmpeg() {
        error!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = check_ytdlp() {
        error!("{}", e);
        std::process::exit(1);
    }

    let store = match vtrim_storage::blob_store_from_env() {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create blob store: {}", e);
            std::process::exit(1);
        }
    };

    let queue_config = QueueConfig::from_env();
    let queue = match RedisJobQueue::new(queue_config.clone()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.ping().await {
        error!("Broker unreachable: {}", e);
        std::process::exit(1);
    }

    let events = match (
        ProgressChannel::new(&queue_config.redis_url),
        RedisStatusStore::new(&queue_config.redis_url, queue_config.status_ttl),
    ) {
        (Ok(notifier), Ok(status)) => EventPublisher::new(Arc::new(notifier), Arc::new(status)),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let toolkit = CliToolkit::new(ProcessRunner::new(config.process_timeout), YtDlpOptions::from_env())
        .with_blob_fetcher(Arc::new(StoreFetcher::new(store.clone())));
    let pipeline = Pipeline::new(&config, Arc::new(toolkit), store.clone(), events);

    let reaper = Reaper::new(ReaperConfig::from_env(&config.work_dir), store);
    info!("Reaper config: {:?}", reaper.config());

    let pool = Arc::new(WorkerPool::new(config, Arc::new(queue), Arc::new(pipeline)));
    let reaper_task = reaper.spawn(pool.subscribe_shutdown());

    // Setup signal handlers
    let signal_pool = Arc::clone(&pool);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_pool.shutdown();
    });

    let result = pool.run().await;
    reaper_task.abort();

    if let Err(e) = result {
        error!("Worker pool error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
