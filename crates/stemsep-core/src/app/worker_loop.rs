//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー（1 件ごと）
//! 1. WorkQueue::blocking_pop() で envelope を取る（タイムアウト無し）
//! 2. 入力 `{id}.mp3` を `<work_dir>/input/` に落とす
//! 3. Transform を `<work_dir>/output` に向けて実行
//! 4. Transform の出力ディレクトリにある各パートを `{id}-{part}.mp3` で上げる
//!
//! どの段階で失敗してもそのジョブは終わり（再投入しない）。ループは続く。
//! shutdown はジョブの合間にだけ見る。実行中のジョブは止めない。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use crate::app::status::{WorkerCounts, WorkerStats};
use crate::config::Settings;
use crate::domain::{
    JobEnvelope, JobError, JobId, JobReport, JobState, Stem, input_key, output_key,
};
use crate::ports::{ObjectStore, QueueError, Transform, WorkQueue};

/// Names and paths the loop works against.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub queue_name: String,
    pub input_bucket: String,
    pub output_bucket: String,
    pub work_dir: PathBuf,
    /// pop が失敗したあと次を試すまでの待ち時間
    pub reconnect_delay: Duration,
}

impl WorkerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            queue_name: settings.queue.name.clone(),
            input_bucket: settings.storage.input_bucket.clone(),
            output_bucket: settings.storage.output_bucket.clone(),
            work_dir: settings.worker.work_dir.clone(),
            reconnect_delay: settings.worker.reconnect_delay(),
        }
    }
}

pub struct WorkerLoop {
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn ObjectStore>,
    transform: Arc<dyn Transform>,
    options: WorkerOptions,
    stats: WorkerStats,
}

impl WorkerLoop {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn ObjectStore>,
        transform: Arc<dyn Transform>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            store,
            transform,
            options,
            stats: WorkerStats::default(),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.options.work_dir.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.options.work_dir.join("output")
    }

    pub fn stats(&self) -> WorkerCounts {
        self.stats.snapshot()
    }

    /// ステージング用ディレクトリを作る
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.input_dir()).await?;
        tokio::fs::create_dir_all(self.output_dir()).await?;
        Ok(())
    }

    /// shutdown が来る（または送信側が drop される）まで回す
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerCounts {
        tracing::info!(
            queue = %self.options.queue_name,
            work_dir = %self.options.work_dir.display(),
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                popped = self.queue.blocking_pop(&self.options.queue_name) => popped,
            };

            match popped {
                Ok(raw) => {
                    self.process(&raw).await;
                }
                Err(e) => {
                    let delay = self.options.reconnect_delay;
                    tracing::error!(
                        queue = %self.options.queue_name,
                        error = %e,
                        "queue pop failed, retrying in {delay:?}"
                    );
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let counts = self.stats.snapshot();
        tracing::info!(done = counts.done, failed = counts.failed, "worker stopped");
        counts
    }

    /// 1 件だけ取り出して処理する
    pub async fn run_once(&self) -> Result<JobReport, QueueError> {
        let raw = self.queue.blocking_pop(&self.options.queue_name).await?;
        Ok(self.process(&raw).await)
    }

    /// キューから取り出した 1 件を処理する。エラーはここで止めて report にする
    pub async fn process(&self, raw: &str) -> JobReport {
        let report = match JobEnvelope::decode(raw) {
            Err(e) => {
                let err = JobError::from(e);
                tracing::warn!(raw, error = %err, "discarding malformed envelope");
                JobReport::failed(&err)
            }
            Ok(envelope) => {
                let span = tracing::info_span!("job", job_id = %envelope.id);
                self.process_envelope(envelope).instrument(span).await
            }
        };
        self.stats.record(&report);
        report
    }

    async fn process_envelope(&self, envelope: JobEnvelope) -> JobReport {
        let result = self.execute(&envelope).await;
        self.cleanup(&envelope.id).await;

        match result {
            Ok(published) => {
                tracing::info!(parts = published.len(), "job done");
                JobReport::done(envelope.id, published)
            }
            Err(err) => {
                tracing::error!(
                    stage = ?err.stage(),
                    kind = ?err.kind(),
                    error = %err,
                    "job failed"
                );
                JobReport::failed(&err)
            }
        }
    }

    async fn execute(&self, envelope: &JobEnvelope) -> Result<Vec<String>, JobError> {
        let id = &envelope.id;
        let mut state = JobState::WaitForJob.advance();

        // FetchInput
        let key = input_key(id);
        let staged = self.input_dir().join(&key);
        tracing::debug!(?state, bucket = %self.options.input_bucket, %key, "fetching input");
        let size = self
            .store
            .get_to_file(&self.options.input_bucket, &key, &staged)
            .await
            .map_err(|e| JobError::InputUnavailable {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        // RunTransform
        state = state.advance();
        let output_dir = self.output_dir();
        let job_dir = self.transform.job_output_dir(&output_dir, id);
        // 前回の残骸があると欠けたパートを見逃す
        remove_path(&job_dir).await;
        tracing::debug!(?state, size, "running transform");
        self.transform
            .run(&staged, &output_dir)
            .await
            .map_err(|e| JobError::TransformFailure {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        // PublishOutputs
        state = state.advance();
        tracing::debug!(?state, dir = %job_dir.display(), "publishing outputs");
        self.publish(id, &job_dir).await
    }

    /// 各パートを上げる。途中で失敗しても残りは試し、上げた分は消さない
    async fn publish(&self, id: &JobId, job_dir: &Path) -> Result<Vec<String>, JobError> {
        let mut published = Vec::with_capacity(Stem::ALL.len());
        let mut failed = Vec::new();

        for stem in Stem::ALL {
            let key = output_key(id, stem);
            let path = job_dir.join(stem.file_name());
            match self
                .store
                .put_file(&self.options.output_bucket, &key, &path)
                .await
            {
                Ok(()) => published.push(key),
                Err(e) => {
                    tracing::warn!(%key, path = %path.display(), error = %e, "part not published");
                    failed.push(key);
                }
            }
        }

        if failed.is_empty() {
            Ok(published)
        } else {
            Err(JobError::PublishPartialFailure {
                id: id.clone(),
                published,
                failed,
            })
        }
    }

    async fn cleanup(&self, id: &JobId) {
        remove_path(&self.input_dir().join(input_key(id))).await;
        remove_path(&self.transform.job_output_dir(&self.output_dir(), id)).await;
    }
}

/// ファイルでもディレクトリでも消す。無ければ何もしない
async fn remove_path(path: &Path) {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to clean up staged files");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryObjectStore, InMemoryWorkQueue};
    use crate::ports::TransformError;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// 入力の中身に `:<part>` を付けて、指定されたパートだけ書く
    struct FakeTransform {
        parts: Vec<Stem>,
        fail: bool,
    }

    impl FakeTransform {
        fn all() -> Self {
            Self {
                parts: Stem::ALL.to_vec(),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Transform for FakeTransform {
        async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), TransformError> {
            if self.fail {
                return Err(TransformError::Exit { code: Some(1) });
            }
            let content = tokio::fs::read(input).await?;
            let stem = input.file_stem().unwrap().to_string_lossy().to_string();
            let dir = output_dir.join("fake").join(stem);
            tokio::fs::create_dir_all(&dir).await?;
            for part in &self.parts {
                let mut bytes = content.clone();
                bytes.extend_from_slice(format!(":{part}").as_bytes());
                tokio::fs::write(dir.join(part.file_name()), bytes).await?;
            }
            Ok(())
        }

        fn job_output_dir(&self, output_dir: &Path, id: &JobId) -> PathBuf {
            output_dir.join("fake").join(id.as_str())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<InMemoryObjectStore>,
        queue: Arc<InMemoryWorkQueue>,
        worker: WorkerLoop,
    }

    async fn fixture(transform: FakeTransform) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::with_buckets(["queue", "output"]));
        let queue = Arc::new(InMemoryWorkQueue::new());
        let worker = WorkerLoop::new(
            queue.clone(),
            store.clone(),
            Arc::new(transform),
            WorkerOptions {
                queue_name: "toWorker".into(),
                input_bucket: "queue".into(),
                output_bucket: "output".into(),
                work_dir: dir.path().to_path_buf(),
                reconnect_delay: Duration::from_millis(10),
            },
        );
        worker.prepare().await.unwrap();
        Fixture {
            _dir: dir,
            store,
            queue,
            worker,
        }
    }

    #[tokio::test]
    async fn publishes_every_part() {
        let fx = fixture(FakeTransform::all()).await;
        fx.store
            .put_object("queue", "abc123.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();

        let report = fx.worker.process(r#"{"id":"abc123"}"#).await;

        assert!(report.is_done(), "{report:?}");
        assert_eq!(
            fx.store.keys("output").await,
            vec![
                "abc123-bass.mp3",
                "abc123-drums.mp3",
                "abc123-other.mp3",
                "abc123-vocals.mp3",
            ]
        );
        assert_eq!(
            fx.store.get_object("output", "abc123-bass.mp3").await.unwrap(),
            Bytes::from_static(b"in:bass")
        );
    }

    #[tokio::test]
    async fn staged_files_are_removed() {
        let fx = fixture(FakeTransform::all()).await;
        fx.store
            .put_object("queue", "abc.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();

        fx.worker.process(r#"{"id":"abc"}"#).await;

        assert!(!fx.worker.input_dir().join("abc.mp3").exists());
        assert!(!fx.worker.output_dir().join("fake").join("abc").exists());
    }

    #[tokio::test]
    async fn missing_input_fails_at_fetch() {
        let fx = fixture(FakeTransform::all()).await;

        let report = fx.worker.process(r#"{"id":"ghost"}"#).await;

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_at, Some(JobState::FetchInput));
        assert!(fx.store.keys("output").await.is_empty());
        assert!(fx.queue.is_empty("toWorker").await);
    }

    #[tokio::test]
    async fn malformed_envelope_is_discarded() {
        let fx = fixture(FakeTransform::all()).await;

        let report = fx.worker.process("not json").await;

        assert_eq!(report.job_id, None);
        assert_eq!(report.failed_at, Some(JobState::WaitForJob));
        assert_eq!(fx.worker.stats().malformed, 1);
    }

    #[tokio::test]
    async fn transform_failure_publishes_nothing() {
        let fx = fixture(FakeTransform {
            parts: vec![],
            fail: true,
        })
        .await;
        fx.store
            .put_object("queue", "abc.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();

        let report = fx.worker.process(r#"{"id":"abc"}"#).await;

        assert_eq!(report.failed_at, Some(JobState::RunTransform));
        assert!(fx.store.keys("output").await.is_empty());
    }

    #[tokio::test]
    async fn missing_part_is_partial_failure() {
        let fx = fixture(FakeTransform {
            parts: vec![Stem::Vocals, Stem::Drums],
            fail: false,
        })
        .await;
        fx.store
            .put_object("queue", "abc.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();

        let report = fx.worker.process(r#"{"id":"abc"}"#).await;

        assert_eq!(report.failed_at, Some(JobState::PublishOutputs));
        assert_eq!(report.published, vec!["abc-vocals.mp3", "abc-drums.mp3"]);
        assert_eq!(
            fx.store.keys("output").await,
            vec!["abc-drums.mp3", "abc-vocals.mp3"]
        );
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fx = fixture(FakeTransform::all()).await;
        fx.store
            .put_object("queue", "abc.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();
        fx.queue
            .push("toWorker", r#"{"id":"abc"}"#.into())
            .await
            .unwrap();
        fx.queue.push("toWorker", "{}".into()).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = Arc::new(fx.worker);
        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.run(rx).await }
        });

        for _ in 0..100 {
            if worker.stats().processed() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        let counts = handle.await.unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.failed, 1);
    }

    /// 最初の pop だけ接続断で失敗し、以降は中の InMemoryWorkQueue に任せる
    struct FlakyQueue {
        inner: InMemoryWorkQueue,
        failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl WorkQueue for FlakyQueue {
        async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
            self.inner.push(queue, payload).await
        }

        async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError> {
            use std::sync::atomic::Ordering;
            if self.failures.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(QueueError::Unavailable("connection reset".into()));
            }
            self.inner.blocking_pop(queue).await
        }

        async fn range(
            &self,
            queue: &str,
            start: isize,
            stop: isize,
        ) -> Result<Vec<String>, QueueError> {
            self.inner.range(queue, start, stop).await
        }

        async fn ping(&self) -> Result<(), QueueError> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn run_survives_pop_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::with_buckets(["queue", "output"]));
        store
            .put_object("queue", "abc.mp3", Bytes::from_static(b"in"))
            .await
            .unwrap();
        let queue = Arc::new(FlakyQueue {
            inner: InMemoryWorkQueue::new(),
            failures: Default::default(),
        });
        queue
            .push("toWorker", r#"{"id":"abc"}"#.into())
            .await
            .unwrap();

        let worker = Arc::new(WorkerLoop::new(
            queue.clone(),
            store.clone(),
            Arc::new(FakeTransform::all()),
            WorkerOptions {
                queue_name: "toWorker".into(),
                input_bucket: "queue".into(),
                output_bucket: "output".into(),
                work_dir: dir.path().to_path_buf(),
                reconnect_delay: Duration::from_millis(10),
            },
        ));
        worker.prepare().await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.run(rx).await }
        });

        for _ in 0..100 {
            if worker.stats().done == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(worker.stats().done, 1);

        // 空のキューで待っているだけで、自分からは止まらない
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        let counts = handle.await.unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.failed, 0);
        assert_eq!(store.keys("output").await.len(), 4);
    }
}
