//! ObjectStore port - Blob ストレージ（MinIO/S3/Local）
//!
//! bucket + key でアドレスされる blob の置き場です。
//! - put はキー単位でアトミック（上書き）
//! - パイプライン側でロックは取らない。並行性はストレージ側に任せる

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("bucket does not exist: {0}")]
    NoSuchBucket(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), StoreError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// At most `limit` entries, in key order where the backend provides one.
    async fn list_objects(&self, bucket: &str, limit: usize)
    -> Result<Vec<ObjectInfo>, StoreError>;

    /// Upload a local file.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(path).await?;
        self.put_object(bucket, key, Bytes::from(bytes)).await
    }

    /// Download into a local file, creating parent directories. Returns the size.
    async fn get_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, StoreError> {
        let bytes = self.get_object(bucket, key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// bucket が無ければ作る。作った場合は true。
pub async fn ensure_bucket(store: &dyn ObjectStore, bucket: &str) -> Result<bool, StoreError> {
    if store.bucket_exists(bucket).await? {
        return Ok(false);
    }
    store.make_bucket(bucket).await?;
    tracing::info!(bucket, "created bucket");
    Ok(true)
}
