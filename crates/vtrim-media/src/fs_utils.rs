//! Filesystem helpers for tool outputs.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Check that a tool left a non-empty regular file at `path`.
///
/// Returns the file size. A zero exit status alone is never taken as proof
/// of output.
pub async fn ensure_nonempty(path: &Path) -> MediaResult<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(MediaError::OutputMissing(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(MediaError::OutputMissing(path.to_path_buf())),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MediaError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_nonempty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert!(matches!(
            ensure_nonempty(&missing).await,
            Err(MediaError::OutputMissing(_))
        ));

        let empty = dir.path().join("empty.mp4");
        fs::write(&empty, b"").await.unwrap();
        assert!(matches!(
            ensure_nonempty(&empty).await,
            Err(MediaError::OutputMissing(_))
        ));

        let full = dir.path().join("full.mp4");
        fs::write(&full, b"data").await.unwrap();
        assert_eq!(ensure_nonempty(&full).await.unwrap(), 4);

        // a directory is not an output file
        assert!(ensure_nonempty(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.mp4");
        fs::write(&path, b"x").await.unwrap();
        remove_if_exists(&path).await.unwrap();
        assert!(!path.exists());
        remove_if_exists(&path).await.unwrap();
    }
}
