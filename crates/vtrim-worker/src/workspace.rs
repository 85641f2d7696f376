//! Per-job scratch directory.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vtrim_models::JobId;

/// `<work_dir>/<job_id>/`, removed when the job is done.
///
/// Call [`JobWorkspace::cleanup`] on every exit path. If the owning task is
/// aborted first, `Drop` removes the directory synchronously instead.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    cleaned: bool,
}

impl JobWorkspace {
    pub async fn create(work_dir: &Path, job_id: &JobId) -> std::io::Result<Self> {
        let dir = work_dir.join(job_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        debug!(job_id = %job_id, dir = %dir.display(), "Created job workspace");
        Ok(Self { dir, cleaned: false })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Remove the directory. Failures are logged; the reaper picks up leftovers.
    pub async fn cleanup(mut self) {
        self.cleaned = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed job workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), "Failed to remove job workspace: {}", e),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), "Failed to remove abandoned job workspace: {}", e);
            }
        }
    }
}
