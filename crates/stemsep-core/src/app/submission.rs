//! SubmissionService - ジョブの受け付け
//!
//! # フロー
//! 1. payload を検証（空・サイズ上限）。ここまで I/O はしない
//! 2. ID を決める（指定があれば検証、無ければ生成）
//! 3. 入力 bucket の `{id}.mp3` に書く
//! 4. envelope をキューに積む
//!
//! 3 が失敗したら 4 はやらない。4 だけ失敗した場合に残る入力オブジェクトは
//! 消さない（同じ ID での再投入で上書きされる）。

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::envelope::present;
use crate::domain::{JobEnvelope, JobId, SubmitError, input_key};
use crate::ports::{IdGenerator, ObjectStore, WorkQueue};

/// HTTP などから届く encoded 形式の投入
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    /// base64 encoded audio
    #[serde(default)]
    pub mp3: Option<String>,

    #[serde(default, alias = "songhash")]
    pub id: Option<String>,

    /// `null` でもキーがあれば envelope に載せる
    #[serde(default, deserialize_with = "present")]
    pub callback: Option<Value>,
}

pub struct SubmissionService {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    ids: Arc<dyn IdGenerator>,
    input_bucket: String,
    queue_name: String,
    max_payload_bytes: usize,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        ids: Arc<dyn IdGenerator>,
        input_bucket: impl Into<String>,
        queue_name: impl Into<String>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            store,
            queue,
            ids,
            input_bucket: input_bucket.into(),
            queue_name: queue_name.into(),
            max_payload_bytes,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// 入力を保存してキューに積み、ジョブ ID を返す
    ///
    /// 空文字の `id` は未指定として扱う。
    #[tracing::instrument(skip_all, fields(size = payload.len(), job_id = tracing::field::Empty))]
    pub async fn submit(
        &self,
        payload: Bytes,
        id: Option<String>,
        callback: Option<Value>,
    ) -> Result<JobId, SubmitError> {
        if payload.is_empty() {
            return Err(SubmitError::Validation("payload is empty".into()));
        }
        self.check_size(payload.len())?;

        let id = match id.filter(|s| !s.is_empty()) {
            Some(s) => JobId::parse(s)?,
            None => self.ids.generate(),
        };
        tracing::Span::current().record("job_id", id.as_str());

        let key = input_key(&id);
        self.store
            .put_object(&self.input_bucket, &key, payload)
            .await
            .map_err(|e| {
                tracing::warn!(bucket = %self.input_bucket, %key, error = %e, "input upload failed");
                SubmitError::DependencyUnavailable(format!("object store: {e}"))
            })?;

        let envelope = JobEnvelope::new(id.clone(), callback);
        self.queue
            .push(&self.queue_name, envelope.encode())
            .await
            .map_err(|e| {
                tracing::warn!(queue = %self.queue_name, error = %e, "enqueue failed, input left in place");
                SubmitError::DependencyUnavailable(format!("queue: {e}"))
            })?;

        tracing::info!(queue = %self.queue_name, %key, "job enqueued");
        Ok(id)
    }

    /// base64 の `mp3` を decode してから [`submit`](Self::submit) する
    ///
    /// 改行などの空白は読み飛ばす（`base64` コマンドは 76 桁で折り返す）。
    /// サイズは decode 前に encoded 長から見積もって弾く。
    pub async fn submit_request(&self, request: SubmitRequest) -> Result<JobId, SubmitError> {
        let encoded: String = request
            .mp3
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if encoded.is_empty() {
            return Err(SubmitError::Validation("missing `mp3` field".into()));
        }

        self.check_size(decoded_len_estimate(&encoded))?;

        let payload = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| SubmitError::Validation(format!("invalid base64 in `mp3`: {e}")))?;

        self.submit(Bytes::from(payload), request.id, request.callback)
            .await
    }

    fn check_size(&self, size: usize) -> Result<(), SubmitError> {
        if size > self.max_payload_bytes {
            return Err(SubmitError::PayloadTooLarge {
                size,
                max: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

/// padded base64 の decode 後サイズ
fn decoded_len_estimate(encoded: &str) -> usize {
    let padding = encoded.bytes().rev().take(2).filter(|b| *b == b'=').count();
    (encoded.len() / 4 * 3).saturating_sub(padding)
}
