//! Blob downloads for the media fallback path.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use vtrim_media::{BlobFetcher, MediaError, MediaResult};
use vtrim_storage::{BlobStore, StorageError};

/// Lets the media toolkit pull uploaded sources from the blob store.
#[derive(Clone)]
pub struct StoreFetcher(Arc<dyn BlobStore>);

impl StoreFetcher {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl BlobFetcher for StoreFetcher {
    async fn fetch(&self, key: &str, dest: &Path) -> MediaResult<()> {
        self.0.download(key, dest).await.map(|_| ()).map_err(|e| match e {
            StorageError::NotFound(key) => MediaError::SourceUnavailable(format!("upload {key} not found")),
            other => MediaError::Storage(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vtrim_models::FailureKind;
    use vtrim_storage::FsBlobStore;

    #[tokio::test]
    async fn test_missing_upload_is_source_unavailable() {
        let root = TempDir::new().unwrap();
        let fetcher = StoreFetcher::new(Arc::new(FsBlobStore::new(root.path())));
        let err = fetcher
            .fetch("uploads/u1/missing.mp4", &root.path().join("out.mkv"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::SourceUnavailable);
    }
}
