//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vtrim_media::{DEFAULT_FALLBACK_CEILING_SECS, DEFAULT_PROCESS_TIMEOUT};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent executors
    pub concurrency: usize,
    /// Parent of the per-job work directories
    pub work_dir: PathBuf,
    /// Wall-clock limit for each external process
    pub process_timeout: Duration,
    /// Grace period for in-flight jobs after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Longest range the fallback path will transcode locally
    pub fallback_ceiling_secs: f64,
    /// How long one dequeue call blocks; bounds shutdown latency
    pub dequeue_wait: Duration,
    /// Lifetime of signed URLs handed to ffmpeg for blob sources
    pub source_url_ttl: Duration,
    /// Lifetime of the result URL sent with `completed`
    pub result_url_ttl: Duration,
    /// Port for the Prometheus scrape endpoint; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            work_dir: PathBuf::from("/tmp/vtrim"),
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            shutdown_timeout: Duration::from_secs(30),
            fallback_ceiling_secs: DEFAULT_FALLBACK_CEILING_SECS,
            dequeue_wait: Duration::from_secs(5),
            source_url_ttl: Duration::from_secs(900),
            result_url_ttl: Duration::from_secs(3600),
            metrics_port: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse::<usize>("WORKER_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            process_timeout: env_parse("WORKER_PROCESS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.process_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            fallback_ceiling_secs: env_parse("FALLBACK_CEILING_SECS")
                .unwrap_or(defaults.fallback_ceiling_secs),
            dequeue_wait: env_parse("WORKER_DEQUEUE_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dequeue_wait),
            source_url_ttl: env_parse("SOURCE_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.source_url_ttl),
            result_url_ttl: env_parse("RESULT_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_url_ttl),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }
}

/// Blob prefix swept by the reaper.
pub const PROCESSED_PREFIX: &str = "processed/";
/// Prefix holding client uploads that queued jobs may still read.
pub const UPLOADS_PREFIX: &str = "uploads/";

/// A blob prefix and how long its objects are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPrefix {
    pub prefix: String,
    pub retention: Duration,
}

impl BlobPrefix {
    pub fn new(prefix: impl Into<String>, retention: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            retention,
        }
    }
}

/// Reaper configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Minimum age before a local entry is deleted
    pub retention: Duration,
    /// Minimum age before an upload is deleted. Must outlast the longest
    /// queue wait plus the process timeout, since a standard job only
    /// reads its upload once dequeued.
    pub upload_retention: Duration,
    /// Local directories whose entries are swept
    pub local_dirs: Vec<PathBuf>,
    /// Blob key prefixes that are swept
    pub prefixes: Vec<BlobPrefix>,
}

impl ReaperConfig {
    /// Defaults for a worker whose jobs live under `work_dir`.
    pub fn for_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        let retention = Duration::from_secs(60 * 60);
        let upload_retention = Duration::from_secs(24 * 60 * 60);
        Self {
            interval: Duration::from_secs(30 * 60),
            retention,
            upload_retention,
            local_dirs: vec![work_dir.into()],
            prefixes: vec![
                BlobPrefix::new(PROCESSED_PREFIX, retention),
                BlobPrefix::new(UPLOADS_PREFIX, upload_retention),
            ],
        }
    }

    /// Create config from environment variables.
    ///
    /// `REAPER_PREFIXES` is a comma list of `prefix` or `prefix=secs`; a
    /// bare `uploads/` keeps the upload retention, other bare prefixes the
    /// general one.
    pub fn from_env(work_dir: impl Into<PathBuf>) -> Self {
        let defaults = Self::for_work_dir(work_dir);
        let retention = env_parse("REAPER_RETENTION_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention);
        let upload_retention = env_parse("REAPER_UPLOAD_RETENTION_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_retention);
        let prefixes = match std::env::var("REAPER_PREFIXES") {
            Ok(s) => parse_prefixes(&s, retention, upload_retention),
            Err(_) => vec![
                BlobPrefix::new(PROCESSED_PREFIX, retention),
                BlobPrefix::new(UPLOADS_PREFIX, upload_retention),
            ],
        };
        Self {
            interval: env_parse("REAPER_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            retention,
            upload_retention,
            local_dirs: std::env::var("REAPER_DIRS")
                .map(|s| split_list(&s).map(PathBuf::from).collect())
                .unwrap_or(defaults.local_dirs),
            prefixes,
        }
    }
}

fn parse_prefixes(s: &str, retention: Duration, upload_retention: Duration) -> Vec<BlobPrefix> {
    split_list(s)
        .map(|item| match item.split_once('=') {
            Some((prefix, secs)) => {
                let prefix = prefix.trim();
                let retention = secs
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .unwrap_or(if prefix == UPLOADS_PREFIX { upload_retention } else { retention });
                BlobPrefix::new(prefix, retention)
            }
            None if item == UPLOADS_PREFIX => BlobPrefix::new(item, upload_retention),
            None => BlobPrefix::new(item, retention),
        })
        .collect()
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty())
}
