//! Blob store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};

/// Information about a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified time, when the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object storage as used by the pipeline.
///
/// Keys are `/`-separated relative paths such as `processed/<job>.mp4`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// URL a client can PUT `content_type` data to.
    async fn presign_upload(&self, key: &str, content_type: &str, expires_in: Duration) -> StorageResult<String>;

    /// Short-lived URL to GET an object.
    async fn presign_download(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Copy an object to a local file; returns bytes written.
    async fn download(&self, key: &str, dest: &Path) -> StorageResult<u64>;

    /// Store a local file under `key`.
    async fn upload(&self, src: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// All objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Cheap reachability check for readiness probes.
    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject keys that could escape a prefix or a filesystem root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|seg| seg == ".." || seg == ".");
    if bad {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
