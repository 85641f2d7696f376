//! Blob storage for uploads and processed artifacts.
//!
//! This crate provides:
//! - The [`BlobStore`] trait used by the pipeline, API and reaper
//! - An S3-compatible implementation (AWS S3, Cloudflare R2, MinIO)
//! - A local directory implementation for development and tests

pub mod client;
pub mod error;
pub mod fs_store;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use fs_store::FsBlobStore;
pub use store::{validate_key, BlobStore, ObjectInfo};

/// Which blob store implementation to use.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobBackend {
    S3,
    Fs(PathBuf),
}

impl BlobBackend {
    /// Read `BLOB_BACKEND` (`s3` or `fs`) and `BLOB_FS_ROOT`.
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("BLOB_BACKEND").unwrap_or_else(|_| "s3".into()).as_str() {
            "s3" => Ok(BlobBackend::S3),
            "fs" => Ok(BlobBackend::Fs(
                std::env::var("BLOB_FS_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/blobs")),
            )),
            other => Err(StorageError::config_error(format!(
                "unknown BLOB_BACKEND '{other}', expected s3 or fs"
            ))),
        }
    }
}

/// Build the configured blob store.
pub fn blob_store_from_env() -> StorageResult<Arc<dyn BlobStore>> {
    Ok(match BlobBackend::from_env()? {
        BlobBackend::S3 => Arc::new(S3BlobStore::from_env()?),
        BlobBackend::Fs(root) => Arc::new(FsBlobStore::new(root)),
    })
}
