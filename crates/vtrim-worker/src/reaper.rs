//! Periodic deletion of stale temporary files and expired artifacts.
//!
//! Stateless between runs: age comes from filesystem and object-store
//! modification times only, so a sweep with nothing new deletes nothing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vtrim_storage::BlobStore;

use crate::config::ReaperConfig;
use crate::metrics;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

pub struct Reaper {
    config: ReaperConfig,
    store: Arc<dyn BlobStore>,
}

impl Reaper {
    pub fn new(config: ReaperConfig, store: Arc<dyn BlobStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep every location, treating `now` as the current time.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match cutoff(now, self.config.retention) {
            Some(cutoff) => {
                for dir in &self.config.local_dirs {
                    let local = sweep_dir(dir, cutoff).await;
                    metrics::record_sweep("local", local.scanned, local.deleted, local.failed);
                    report.merge(local);
                }
            }
            None => warn!(retention = ?self.config.retention, "Retention out of range; skipping local dirs"),
        }

        for prefix in &self.config.prefixes {
            let Some(cutoff) = cutoff(now, prefix.retention) else {
                warn!(prefix = %prefix.prefix, retention = ?prefix.retention, "Retention out of range; skipping prefix");
                continue;
            };
            let blobs = self.sweep_prefix(&prefix.prefix, cutoff).await;
            metrics::record_sweep("blob", blobs.scanned, blobs.deleted, blobs.failed);
            report.merge(blobs);
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            "Reaper sweep finished"
        );
        report
    }

    async fn sweep_prefix(&self, prefix: &str, cutoff: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let objects = match self.store.list(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(prefix, "Failed to list blobs: {}", e);
                report.failed += 1;
                return report;
            }
        };

        for object in objects {
            report.scanned += 1;
            let Some(modified) = object.last_modified else {
                debug!(key = %object.key, "No modification time; skipping");
                continue;
            };
            if modified >= cutoff {
                continue;
            }
            match self.store.delete(&object.key).await {
                Ok(()) => {
                    debug!(key = %object.key, "Deleted expired blob");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(key = %object.key, "Failed to delete blob: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Sweep every `interval` until shutdown.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            // first tick is immediate; the worker just started
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Reaper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Entries modified before the returned instant are expired.
fn cutoff(now: DateTime<Utc>, retention: std::time::Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention))
}

async fn sweep_dir(dir: &Path, cutoff: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!(dir = %dir.display(), "Failed to read directory: {}", e);
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), "Failed to read directory entry: {}", e);
                report.failed += 1;
                break;
            }
        };
        report.scanned += 1;
        let path = entry.path();

        let modified = match newest_mtime(&path).await {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), "Failed to stat entry: {}", e);
                report.failed += 1;
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }

        match remove_entry(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted stale entry");
                report.deleted += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), "Failed to delete entry: {}", e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Latest modification time in a file or directory tree.
///
/// A job directory whose files are still being written is not stale even
/// if the directory entry itself has not changed.
async fn newest_mtime(path: &Path) -> std::io::Result<Option<DateTime<Utc>>> {
    let mut newest: Option<DateTime<Utc>> = None;
    let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];

    while let Some(current) = pending.pop() {
        let meta = match tokio::fs::symlink_metadata(&current).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if let Ok(modified) = meta.modified() {
            let modified = DateTime::<Utc>::from(modified);
            newest = Some(newest.map_or(modified, |n| n.max(modified)));
        }
        if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push(entry.path());
            }
        }
    }
    Ok(newest)
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use vtrim_storage::FsBlobStore;

    use crate::config::BlobPrefix;

    fn reaper(work: &Path, blobs: &Path) -> Reaper {
        let config = ReaperConfig::for_work_dir(work);
        Reaper::new(config, Arc::new(FsBlobStore::new(blobs)))
    }

    async fn seed(work: &Path, blobs: &Path) {
        tokio::fs::create_dir_all(work.join("job-a")).await.unwrap();
        tokio::fs::write(work.join("job-a/source.mkv"), b"x").await.unwrap();
        tokio::fs::write(work.join("stray.tmp"), b"x").await.unwrap();
        for key in ["processed/j1.mp4", "uploads/u1/a.mp4", "other/keep.bin"] {
            let path = blobs.join(key);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, b"x").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fresh_entries_survive() {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        seed(work.path(), blobs.path()).await;

        let report = reaper(work.path(), blobs.path()).sweep().await;
        assert_eq!(report.deleted, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.scanned, 4);
        assert!(work.path().join("job-a/source.mkv").exists());
    }

    #[tokio::test]
    async fn test_expired_entries_removed_and_second_sweep_is_noop() {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        seed(work.path(), blobs.path()).await;
        let reaper = reaper(work.path(), blobs.path());
        let later = Utc::now() + chrono::Duration::hours(2);

        let first = reaper.sweep_at(later).await;
        assert_eq!(
            first,
            SweepReport {
                scanned: 4,
                deleted: 3,
                failed: 0
            }
        );
        assert!(!work.path().join("job-a").exists());
        assert!(!blobs.path().join("processed/j1.mp4").exists());
        assert!(blobs.path().join("uploads/u1/a.mp4").exists());
        assert!(blobs.path().join("other/keep.bin").exists());

        let second = reaper.sweep_at(later).await;
        assert_eq!(second.deleted, 0);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn test_missing_local_dir_is_not_an_error() {
        let blobs = TempDir::new().unwrap();
        let reaper = reaper(Path::new("/nonexistent/vtrim-work"), blobs.path());
        let report = reaper.sweep().await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_retention_boundary() {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        tokio::fs::write(work.path().join("f.tmp"), b"x").await.unwrap();
        let mut config = ReaperConfig::for_work_dir(work.path());
        config.retention = Duration::from_secs(3600);
        config.prefixes.clear();
        let reaper = Reaper::new(config, Arc::new(FsBlobStore::new(blobs.path())));

        let just_inside = Utc::now() + chrono::Duration::minutes(59);
        assert_eq!(reaper.sweep_at(just_inside).await.deleted, 0);
        let past = Utc::now() + chrono::Duration::minutes(61);
        assert_eq!(reaper.sweep_at(past).await.deleted, 1);
    }

    #[tokio::test]
    async fn test_uploads_outlive_processed_results() {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        seed(work.path(), blobs.path()).await;
        let reaper = reaper(work.path(), blobs.path());

        // a standard job that has waited three hours still finds its input
        let after_long_wait = Utc::now() + chrono::Duration::hours(3);
        reaper.sweep_at(after_long_wait).await;
        assert!(!blobs.path().join("processed/j1.mp4").exists());
        assert!(blobs.path().join("uploads/u1/a.mp4").exists());

        let next_day = Utc::now() + chrono::Duration::hours(25);
        let report = reaper.sweep_at(next_day).await;
        assert_eq!(report.deleted, 1);
        assert!(!blobs.path().join("uploads/u1/a.mp4").exists());
    }

    #[tokio::test]
    async fn test_each_prefix_uses_its_own_retention() {
        let work = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        for key in ["fast/a.bin", "slow/b.bin"] {
            let path = blobs.path().join(key);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, b"x").await.unwrap();
        }
        let mut config = ReaperConfig::for_work_dir(work.path());
        config.prefixes = vec![
            BlobPrefix::new("fast/", Duration::from_secs(60)),
            BlobPrefix::new("slow/", Duration::from_secs(7200)),
        ];
        let reaper = Reaper::new(config, Arc::new(FsBlobStore::new(blobs.path())));

        let report = reaper.sweep_at(Utc::now() + chrono::Duration::minutes(30)).await;
        assert_eq!(report.deleted, 1);
        assert!(!blobs.path().join("fast/a.bin").exists());
        assert!(blobs.path().join("slow/b.bin").exists());
    }
}
