//! RetrievalService - 出力の取得・削除とキューの参照

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::domain::{JobEnvelope, JobId, RetrievalError, Stem, output_key};
use crate::ports::{ObjectStore, QueueError, StoreError, WorkQueue};

/// キュー上の 1 件。decode できないものは生の文字列のまま見せる
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PendingEntry {
    Envelope(JobEnvelope),
    Unparseable(String),
}

impl PendingEntry {
    fn from_raw(raw: String) -> Self {
        match JobEnvelope::decode(&raw) {
            Ok(envelope) => PendingEntry::Envelope(envelope),
            Err(_) => PendingEntry::Unparseable(raw),
        }
    }
}

pub struct RetrievalService {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    input_bucket: String,
    output_bucket: String,
    queue_name: String,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        input_bucket: impl Into<String>,
        output_bucket: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            input_bucket: input_bucket.into(),
            output_bucket: output_bucket.into(),
            queue_name: queue_name.into(),
        }
    }

    /// `{id}-{part}.mp3` を読む。返り値はキーと中身
    #[tracing::instrument(skip(self))]
    pub async fn fetch_part(&self, id: &str, part: &str) -> Result<(String, Bytes), RetrievalError> {
        let key = self.part_key(id, part)?;
        let bytes = self
            .store
            .get_object(&self.output_bucket, &key)
            .await
            .map_err(|e| self.store_error(&key, e))?;
        Ok((key, bytes))
    }

    /// 出力を 1 つ消す。存在しなくても成功扱い（S3 の DELETE と同じ）
    #[tracing::instrument(skip(self))]
    pub async fn remove_part(&self, id: &str, part: &str) -> Result<String, RetrievalError> {
        let key = self.part_key(id, part)?;
        self.store
            .remove_object(&self.output_bucket, &key)
            .await
            .map_err(|e| self.store_error(&key, e))?;
        tracing::info!(bucket = %self.output_bucket, %key, "removed output");
        Ok(key)
    }

    /// 先頭から最大 `limit` 件。取り出しはしない
    pub async fn pending(&self, limit: usize) -> Result<Vec<PendingEntry>, RetrievalError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        let raw = self
            .queue
            .range(&self.queue_name, 0, stop)
            .await
            .map_err(queue_error)?;
        Ok(raw.into_iter().map(PendingEntry::from_raw).collect())
    }

    /// キューとストレージの両方に届くか
    pub async fn health(&self) -> Result<(), RetrievalError> {
        self.queue.ping().await.map_err(queue_error)?;
        self.store
            .list_objects(&self.input_bucket, 1)
            .await
            .map_err(|e| RetrievalError::DependencyUnavailable(format!("object store: {e}")))?;
        Ok(())
    }

    fn part_key(&self, id: &str, part: &str) -> Result<String, RetrievalError> {
        let id = JobId::parse(id)?;
        let stem: Stem = part.parse()?;
        Ok(output_key(&id, stem))
    }

    fn store_error(&self, key: &str, e: StoreError) -> RetrievalError {
        if e.is_not_found() {
            RetrievalError::NotFound {
                bucket: self.output_bucket.clone(),
                key: key.to_string(),
            }
        } else {
            tracing::warn!(bucket = %self.output_bucket, key, error = %e, "object store request failed");
            RetrievalError::DependencyUnavailable(format!("object store: {e}"))
        }
    }
}

fn queue_error(e: QueueError) -> RetrievalError {
    RetrievalError::DependencyUnavailable(format!("queue: {e}"))
}
