//! Filesystem-backed blob store.

use super::{validate_key, BlobStore, BlobStoreError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Stores blobs as plain files under a root directory; keys map directly to
/// relative paths. Signed URLs carry an expiry and an HMAC-style token so the
/// serving layer can verify them without consulting the store.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
    signing_secret: String,
}

impl FsBlobStore {
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            signing_secret: signing_secret.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        Ok(self.root.join(validate_key(key)?))
    }

    fn token_for(&self, key: &str, expires: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update(expires.to_string().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Check a url token produced by [`BlobStore::signed_url`].
    pub fn verify_token(&self, key: &str, expires: u64, token: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        expires >= now && self.token_for(key, expires) == token
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        local_path: &Path,
        key: &str,
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        let target = self.path_for(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &target).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let target = self.path_for(key)?;
        Ok(fs::try_exists(&target).await?)
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<(), BlobStoreError> {
        let source = self.path_for(key)?;
        if !fs::try_exists(&source).await? {
            return Err(BlobStoreError::NotFound(key.to_string()));
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, local_path).await?;
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String, BlobStoreError> {
        validate_key(key)?;
        let expires = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            + ttl_secs;
        let token = self.token_for(key, expires);
        Ok(format!(
            "{}/{}?expires={}&token={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(key),
            expires,
            token
        ))
    }
}
