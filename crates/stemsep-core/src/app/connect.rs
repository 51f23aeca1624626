//! Connect - 依存サービスへの接続ライフサイクル
//!
//! プロセスごとに 1 回だけクライアントを組み立て、到達できるまで固定間隔で
//! リトライしてから、必要な bucket を用意します。出来上がった
//! `Connections` を各サービスに注入します（グローバルは使わない）。

use std::future::Future;
use std::sync::Arc;

use crate::app::retry::RetryPolicy;
use crate::config::{Settings, StorageBackend};
use crate::impls::{
    InMemoryObjectStore, InMemoryWorkQueue, LocalObjectStore, RedisWorkQueue, S3ObjectStore,
};
use crate::ports::{ObjectStore, QueueError, StoreError, WorkQueue, ensure_bucket};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("object store: {0}")]
    Store(#[from] StoreError),
}

/// Shared, long-lived clients for one process.
#[derive(Clone)]
pub struct Connections {
    pub queue: Arc<dyn WorkQueue>,
    pub store: Arc<dyn ObjectStore>,
}

/// `op` が成功するまで `policy` に従ってリトライする
///
/// `max_attempts` に達した場合は最後のエラーを返す。
pub async fn retry_until_ready<T, E, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(dependency = what, attempts, "dependency ready");
                }
                return Ok(value);
            }
            Err(e) if policy.should_retry(attempts) => {
                let delay = policy.delay;
                tracing::warn!(
                    dependency = what,
                    attempts,
                    error = %e,
                    "dependency not ready yet, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl Connections {
    pub fn new(queue: Arc<dyn WorkQueue>, store: Arc<dyn ObjectStore>) -> Self {
        Self { queue, store }
    }

    /// 設定からクライアントを作り、疎通確認と bucket 作成まで済ませる
    pub async fn connect(settings: &Settings, policy: &RetryPolicy) -> Result<Self, ConnectError> {
        let queue = connect_queue(settings, policy).await?;
        let store = connect_store(settings, policy).await?;

        let conns = Self::new(queue, store);
        conns
            .ensure_buckets(&[
                settings.storage.input_bucket.as_str(),
                settings.storage.output_bucket.as_str(),
            ])
            .await?;
        Ok(conns)
    }

    pub async fn ensure_buckets(&self, buckets: &[&str]) -> Result<(), StoreError> {
        for bucket in buckets {
            ensure_bucket(self.store.as_ref(), bucket).await?;
        }
        Ok(())
    }
}

async fn connect_queue(
    settings: &Settings,
    policy: &RetryPolicy,
) -> Result<Arc<dyn WorkQueue>, QueueError> {
    if settings.storage.backend == StorageBackend::Memory {
        // memory 構成は単一プロセスの開発用。Redis にも繋がない
        return Ok(Arc::new(InMemoryWorkQueue::new()));
    }
    let url = settings.redis.url();
    let queue = retry_until_ready("redis", policy, || async {
        let queue = RedisWorkQueue::connect(&url).await?;
        queue.ping().await?;
        Ok::<_, QueueError>(queue)
    })
    .await?;
    tracing::info!(%url, "connected to redis");
    Ok(Arc::new(queue))
}

async fn connect_store(
    settings: &Settings,
    policy: &RetryPolicy,
) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let storage = &settings.storage;
    let store: Arc<dyn ObjectStore> = match storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(storage.local_root.clone())?),
        StorageBackend::S3 => Arc::new(S3ObjectStore::new(
            &storage.endpoint,
            &storage.region,
            &storage.access_key,
            &storage.secret_key,
        )?),
    };

    // bucket_exists が通れば疎通できている
    let first_bucket = storage.input_bucket.as_str();
    retry_until_ready("object store", policy, || store.bucket_exists(first_bucket)).await?;
    tracing::info!(backend = ?storage.backend, endpoint = %storage.endpoint, "connected to object store");
    Ok(store)
}
