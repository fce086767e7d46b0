//! Durable recording storage.
//!
//! The pipeline treats blob storage as an opaque collaborator with four
//! operations; durability is best-effort and never a hard dependency of
//! producing a score. [`FsBlobStore`] keeps blobs on the local filesystem,
//! which is also what the test harness runs against.

mod fs_store;

pub use fs_store::FsBlobStore;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// `put/exists/get/signed_url` contract over durable storage.
///
/// Keys are namespaced `{kind}/{user_id}/{filename}`; implementations must
/// reject keys that could escape their root.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under `key`, overwriting any previous blob.
    async fn put(&self, local_path: &Path, key: &str, content_type: &str)
        -> Result<(), BlobStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;

    /// Download the blob at `key` to `local_path`.
    async fn get(&self, key: &str, local_path: &Path) -> Result<(), BlobStoreError>;

    /// A time-limited URL for client playback of the blob.
    fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String, BlobStoreError>;
}

/// Validate a blob key: non-empty `/`-separated segments, no traversal, a
/// conservative character set. Returns the key unchanged.
pub(crate) fn validate_key(key: &str) -> Result<&str, BlobStoreError> {
    if key.is_empty() || key.len() > 512 {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
    }
    Ok(key)
}
