//! Local directory blob store for development and tests.
//!
//! Keys map to files under a root directory. Presigned URLs are plain
//! `file://` URLs; they carry no signature and never expire.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, BlobStore, ObjectInfo};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path backing `key`.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn file_url(&self, key: &str) -> StorageResult<String> {
        let path = self.path_for(key)?;
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(format!("file://{}", absolute.display()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn presign_upload(&self, key: &str, _content_type: &str, _expires_in: Duration) -> StorageResult<String> {
        self.file_url(key)
    }

    async fn presign_download(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        self.file_url(key)
    }

    async fn download(&self, key: &str, dest: &Path) -> StorageResult<u64> {
        let src = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::not_found(key),
            _ => StorageError::download_failed(e.to_string()),
        })
    }

    async fn upload(&self, src: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        debug!("Stored {} at {}", key, dest.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::ListFailed(e.to_string())),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else { continue };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    objects.push(ObjectInfo {
                        key,
                        size: meta.len(),
                        last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = FsBlobStore::new(root.path());

        let src = scratch.path().join("clip.mp4");
        tokio::fs::write(&src, b"video bytes").await.unwrap();
        store.upload(&src, "processed/j1.mp4", "video/mp4").await.unwrap();

        let dest = scratch.path().join("copy/clip.mp4");
        let n = store.download("processed/j1.mp4", &dest).await.unwrap();
        assert_eq!(n, 11);

        store.delete("processed/j1.mp4").await.unwrap();
        store.delete("processed/j1.mp4").await.unwrap();
        assert!(matches!(
            store.download("processed/j1.mp4", &dest).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = FsBlobStore::new(root.path());
        let src = scratch.path().join("f");
        tokio::fs::write(&src, b"x").await.unwrap();

        store.upload(&src, "processed/a.mp4", "video/mp4").await.unwrap();
        store.upload(&src, "processed/b.mp4", "video/mp4").await.unwrap();
        store.upload(&src, "uploads/u1/c.mp4", "video/mp4").await.unwrap();

        let processed = store.list("processed/").await.unwrap();
        let keys: Vec<_> = processed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["processed/a.mp4", "processed/b.mp4"]);
        assert!(processed.iter().all(|o| o.last_modified.is_some()));

        assert_eq!(store.list("").await.unwrap().len(), 3);
        assert!(store.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let root = TempDir::new().unwrap();
        let store = FsBlobStore::new(root.path());
        assert!(matches!(
            store.presign_download("../outside", Duration::from_secs(60)).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_presign_is_file_url() {
        let root = TempDir::new().unwrap();
        let store = FsBlobStore::new(root.path());
        let url = store
            .presign_download("processed/j.mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("processed/j.mp4"));
    }
}
