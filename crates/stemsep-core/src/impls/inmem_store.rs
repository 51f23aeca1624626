//! InMemoryObjectStore - 開発・テスト用の Blob ストレージ

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::ports::{ObjectInfo, ObjectStore, StoreError};

/// bucket -> (key -> bytes)。BTreeMap なので list はキー順になる。
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Bytes>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定 bucket を作成済みの状態で始める
    pub fn with_buckets<'a>(buckets: impl IntoIterator<Item = &'a str>) -> Self {
        let map = buckets
            .into_iter()
            .map(|b| (b.to_string(), BTreeMap::new()))
            .collect();
        Self {
            buckets: Mutex::new(map),
        }
    }

    /// bucket 内の全キー（テスト用）
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let buckets = self.buckets.lock().await;
        buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(self.buckets.lock().await.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let mut buckets = self.buckets.lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let buckets = self.buckets.lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut buckets = self.buckets.lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        // S3 と同じく、存在しないキーの削除は成功扱い
        objects.remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        limit: usize,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        let buckets = self.buckets.lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        Ok(objects
            .iter()
            .take(limit)
            .map(|(key, bytes)| ObjectInfo {
                key: key.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ensure_bucket;

    #[tokio::test]
    async fn put_get_overwrites() {
        let store = InMemoryObjectStore::with_buckets(["queue"]);
        store
            .put_object("queue", "a.mp3", Bytes::from_static(b"v1"))
            .await
            .unwrap();
        store
            .put_object("queue", "a.mp3", Bytes::from_static(b"v2"))
            .await
            .unwrap();
        let got = store.get_object("queue", "a.mp3").await.unwrap();
        assert_eq!(&got[..], b"v2");
    }

    #[tokio::test]
    async fn missing_key_and_bucket_are_distinct() {
        let store = InMemoryObjectStore::with_buckets(["queue"]);
        let err = store.get_object("queue", "nope").await.unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .put_object("output", "x", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchBucket(b) if b == "output"));
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let store = InMemoryObjectStore::new();
        assert!(ensure_bucket(&store, "output").await.unwrap());
        assert!(!ensure_bucket(&store, "output").await.unwrap());
        assert!(store.bucket_exists("output").await.unwrap());
    }

    #[tokio::test]
    async fn list_respects_limit() {
        let store = InMemoryObjectStore::with_buckets(["output"]);
        for key in ["c", "a", "b"] {
            store
                .put_object("output", key, Bytes::from_static(b"xx"))
                .await
                .unwrap();
        }
        let listed = store.list_objects("output", 2).await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(listed[0].size, 2);
    }

    #[tokio::test]
    async fn file_helpers_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::with_buckets(["queue"]);
        let src = dir.path().join("src.mp3");
        tokio::fs::write(&src, b"audio").await.unwrap();

        store.put_file("queue", "k.mp3", &src).await.unwrap();
        let dst = dir.path().join("nested/dst.mp3");
        let size = store.get_to_file("queue", "k.mp3", &dst).await.unwrap();

        assert_eq!(size, 5);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"audio");
    }
}
