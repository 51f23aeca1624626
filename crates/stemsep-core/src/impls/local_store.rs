//! LocalObjectStore - ローカルファイルシステム上の Blob ストレージ（開発用）
//!
//! `root/<bucket>/<key>` に保存します。bucket はディレクトリです。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore as _, PutPayload};

use crate::ports::{ObjectInfo, ObjectStore, StoreError};

pub struct LocalObjectStore {
    root: PathBuf,
    inner: Arc<LocalFileSystem>,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        let fs = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            root,
            inner: Arc::new(fs),
        })
    }

    fn location(bucket: &str, key: &str) -> StorePath {
        StorePath::from(format!("{bucket}/{key}"))
    }

    async fn require_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }
}

fn store_error(bucket: &str, key: &str, e: object_store::Error) -> StoreError {
    match e {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.root.join(bucket)).await?)
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        self.inner
            .put(&Self::location(bucket, key), PutPayload::from(bytes))
            .await
            .map_err(|e| store_error(bucket, key, e))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        self.require_bucket(bucket).await?;
        let result = self
            .inner
            .get(&Self::location(bucket, key))
            .await
            .map_err(|e| store_error(bucket, key, e))?;
        result.bytes().await.map_err(|e| store_error(bucket, key, e))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        match self.inner.delete(&Self::location(bucket, key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(store_error(bucket, key, e)),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        limit: usize,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        self.require_bucket(bucket).await?;
        let prefix = StorePath::from(bucket);
        let metas: Vec<_> = self
            .inner
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| store_error(bucket, "", e))?;

        let strip = format!("{bucket}/");
        let mut objects: Vec<ObjectInfo> = metas
            .into_iter()
            .filter_map(|meta| {
                let key = meta.location.as_ref().strip_prefix(&strip)?.to_string();
                Some(ObjectInfo {
                    key,
                    size: meta.size as u64,
                })
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects.truncate(limit);
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buckets_are_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();

        assert!(!store.bucket_exists("queue").await.unwrap());
        store.make_bucket("queue").await.unwrap();
        assert!(store.bucket_exists("queue").await.unwrap());
        assert!(dir.path().join("queue").is_dir());
    }

    #[tokio::test]
    async fn put_get_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();
        store.make_bucket("output").await.unwrap();

        store
            .put_object("output", "abc-vocals.mp3", Bytes::from_static(b"v"))
            .await
            .unwrap();
        store
            .put_object("output", "abc-bass.mp3", Bytes::from_static(b"bb"))
            .await
            .unwrap();

        let got = store.get_object("output", "abc-bass.mp3").await.unwrap();
        assert_eq!(&got[..], b"bb");

        let listed = store.list_objects("output", 10).await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["abc-bass.mp3", "abc-vocals.mp3"]);

        store.remove_object("output", "abc-bass.mp3").await.unwrap();
        store.remove_object("output", "abc-bass.mp3").await.unwrap();
        let err = store
            .get_object("output", "abc-bass.mp3")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn put_into_missing_bucket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();
        let err = store
            .put_object("nope", "k", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchBucket(_)));
    }
}
