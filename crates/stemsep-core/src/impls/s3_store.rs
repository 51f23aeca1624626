//! S3ObjectStore - MinIO/S3 互換ストレージ（本番用）
//!
//! MinIO は virtual-hosted style の名前解決ができないことが多いので、
//! 常に path-style でアクセスします。

use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};

use crate::ports::{ObjectInfo, ObjectStore, StoreError};

pub struct S3ObjectStore {
    region: Region,
    credentials: Credentials,
}

impl S3ObjectStore {
    /// `endpoint` は `http://minio:9000` のようなスキーム付き URL
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StoreError> {
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StoreError::Unavailable(format!("invalid credentials: {e}")))?;
        Ok(Self {
            region: Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StoreError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(bucket.with_path_style())
    }
}

fn status_error(bucket: &str, key: &str, status: u16, body: String) -> StoreError {
    match status {
        404 if body.contains("NoSuchBucket") => StoreError::NoSuchBucket(bucket.to_string()),
        404 => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Unavailable(format!("{bucket}/{key}: HTTP {status}: {body}")),
    }
}

fn s3_error(bucket: &str, key: &str, e: S3Error) -> StoreError {
    match e {
        S3Error::HttpFailWithBody(status, body) => status_error(bucket, key, status, body),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn check_status(bucket: &str, key: &str, status: u16, body: &[u8]) -> Result<(), StoreError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(status_error(
        bucket,
        key,
        status,
        String::from_utf8_lossy(body).into_owned(),
    ))
}

/// S3 が 1 リクエストで返す最大件数
const MAX_KEYS_PER_PAGE: usize = 1000;

/// 次のページで頼む件数。もう要らなければ None
fn next_page_size(collected: usize, limit: usize) -> Option<usize> {
    let remaining = limit.saturating_sub(collected);
    (remaining > 0).then(|| remaining.min(MAX_KEYS_PER_PAGE))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        self.bucket(bucket)?
            .exists()
            .await
            .map_err(|e| s3_error(bucket, "", e))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let response = Bucket::create_with_path_style(
            bucket,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| s3_error(bucket, "", e))?;
        if !response.success() {
            return Err(StoreError::Unavailable(format!(
                "create bucket {bucket}: HTTP {}: {}",
                response.response_code, response.response_text
            )));
        }
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let response = self
            .bucket(bucket)?
            .put_object(key, &bytes)
            .await
            .map_err(|e| s3_error(bucket, key, e))?;
        check_status(bucket, key, response.status_code(), response.as_slice())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .await
            .map_err(|e| s3_error(bucket, key, e))?;
        check_status(bucket, key, response.status_code(), response.as_slice())?;
        Ok(Bytes::copy_from_slice(response.as_slice()))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let response = self
            .bucket(bucket)?
            .delete_object(key)
            .await
            .map_err(|e| s3_error(bucket, key, e))?;
        check_status(bucket, key, response.status_code(), response.as_slice())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        limit: usize,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        let handle = self.bucket(bucket)?;
        let mut objects = Vec::new();
        let mut token = None;

        while let Some(max_keys) = next_page_size(objects.len(), limit) {
            let (page, status) = handle
                .list_page(String::new(), None, token.take(), None, Some(max_keys))
                .await
                .map_err(|e| s3_error(bucket, "", e))?;
            check_status(bucket, "", status, &[])?;

            objects.extend(page.contents.into_iter().map(|object| ObjectInfo {
                key: object.key,
                size: object.size,
            }));
            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        objects.truncate(limit);
        Ok(objects)
    }
}
