//! PipelineBuilder - サービスとワーカーの組み立て
//!
//! # Fail-fast 設計
//! - 必要な部品（queue / store / transform）が揃っていなければ
//!   build 時に BuildError を返す
//! - 足りない部品は名前の一覧で返す（起動ログで何を忘れたか分かる）

use std::sync::Arc;

use crate::app::connect::Connections;
use crate::app::retrieval::RetrievalService;
use crate::app::submission::SubmissionService;
use crate::app::worker_loop::{WorkerLoop, WorkerOptions};
use crate::config::Settings;
use crate::ports::{IdGenerator, ObjectStore, RandomIdGenerator, Transform, WorkQueue};

/// PipelineBuilder は設定と ports の実装からアプリケーションを作る
///
/// # 使用例
/// ```ignore
/// let conns = Connections::connect(&settings, &RetryPolicy::default()).await?;
/// let services = PipelineBuilder::new(settings)
///     .connections(conns)
///     .build_services()?;
/// ```
pub struct PipelineBuilder {
    settings: Settings,
    queue: Option<Arc<dyn WorkQueue>>,
    store: Option<Arc<dyn ObjectStore>>,
    transform: Option<Arc<dyn Transform>>,
    ids: Arc<dyn IdGenerator>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before building.")]
    MissingComponents(Vec<&'static str>),
}

/// 投入側（HTTP / CLI）が使うサービス一式
#[derive(Clone)]
pub struct Services {
    pub submission: Arc<SubmissionService>,
    pub retrieval: Arc<RetrievalService>,
    /// キュー参照で返す最大件数
    pub inspect_limit: usize,
}

impl PipelineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            queue: None,
            store: None,
            transform: None,
            ids: Arc::new(RandomIdGenerator),
        }
    }

    pub fn connections(self, conns: Connections) -> Self {
        self.queue(conns.queue).store(conns.store)
    }

    pub fn queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// ID 生成を差し替える（既定は 128-bit 乱数）
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn build_services(self) -> Result<Services, BuildError> {
        let (queue, store, _) = self.require(false)?;
        let s = &self.settings;

        let submission = SubmissionService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&self.ids),
            s.storage.input_bucket.clone(),
            s.queue.name.clone(),
            s.submission.max_payload_bytes,
        );
        let retrieval = RetrievalService::new(
            store,
            queue,
            s.storage.input_bucket.clone(),
            s.storage.output_bucket.clone(),
            s.queue.name.clone(),
        );

        Ok(Services {
            submission: Arc::new(submission),
            retrieval: Arc::new(retrieval),
            inspect_limit: s.queue.inspect_limit,
        })
    }

    pub fn build_worker(self) -> Result<WorkerLoop, BuildError> {
        let (queue, store, transform) = self.require(true)?;
        let transform = transform.ok_or(BuildError::MissingComponents(vec!["transform"]))?;
        Ok(WorkerLoop::new(
            queue,
            store,
            transform,
            WorkerOptions::from_settings(&self.settings),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn require(
        &self,
        need_transform: bool,
    ) -> Result<
        (
            Arc<dyn WorkQueue>,
            Arc<dyn ObjectStore>,
            Option<Arc<dyn Transform>>,
        ),
        BuildError,
    > {
        let mut missing = Vec::new();
        if self.queue.is_none() {
            missing.push("queue");
        }
        if self.store.is_none() {
            missing.push("store");
        }
        if need_transform && self.transform.is_none() {
            missing.push("transform");
        }

        match (&self.queue, &self.store) {
            (Some(queue), Some(store)) if missing.is_empty() => Ok((
                Arc::clone(queue),
                Arc::clone(store),
                self.transform.clone(),
            )),
            _ => Err(BuildError::MissingComponents(missing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{CommandTransform, InMemoryObjectStore, InMemoryWorkQueue};
    use bytes::Bytes;

    fn settings() -> Settings {
        Settings::load_from(None).unwrap()
    }

    #[test]
    fn test_build_services_success() {
        let services = PipelineBuilder::new(settings())
            .queue(Arc::new(InMemoryWorkQueue::new()))
            .store(Arc::new(InMemoryObjectStore::new()))
            .build_services();
        assert!(services.is_ok());
    }

    #[test]
    fn test_build_services_missing_components() {
        let result = PipelineBuilder::new(settings())
            .queue(Arc::new(InMemoryWorkQueue::new()))
            .build_services();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponents(missing)) if missing == vec!["store"]
        ));
    }

    #[test]
    fn test_build_worker_needs_transform() {
        let result = PipelineBuilder::new(settings())
            .build_worker();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponents(missing)) if missing == vec!["queue", "store", "transform"]
        ));

        let worker = PipelineBuilder::new(settings())
            .queue(Arc::new(InMemoryWorkQueue::new()))
            .store(Arc::new(InMemoryObjectStore::new()))
            .transform(Arc::new(CommandTransform::demucs()))
            .build_worker();
        assert!(worker.is_ok());
    }

    #[tokio::test]
    async fn test_services_share_connections() {
        let store = Arc::new(InMemoryObjectStore::with_buckets(["queue", "output"]));
        let queue = Arc::new(InMemoryWorkQueue::new());
        let services = PipelineBuilder::new(settings())
            .connections(Connections::new(queue.clone(), store.clone()))
            .build_services()
            .unwrap();

        let id = services
            .submission
            .submit(Bytes::from_static(b"x"), Some("shared".into()), None)
            .await
            .unwrap();
        let pending = services.retrieval.pending(services.inspect_limit).await.unwrap();

        assert_eq!(id.as_str(), "shared");
        assert_eq!(pending.len(), 1);
        assert_eq!(store.keys("queue").await, vec!["shared.mp3"]);
    }
}
