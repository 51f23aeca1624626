//! InMemoryWorkQueue - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による blocking pop
//! - `Notified::enable()` でロック解放前に待機登録し、通知の取りこぼしを防ぐ
//! - queue 名ごとの複数キュー管理

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::ports::{QueueError, WorkQueue};

/// InMemoryWorkQueue は開発・テスト用の配送キュー
///
/// # 実装詳細
/// - HashMap<String, VecDeque<String>> で queue 名ごとにキューを管理
/// - push 時に notify_waiters で待機中の pop をすべて起こし、各自が自分の
///   キューを見直す
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryWorkQueue::new();
/// queue.push("toWorker", envelope.encode()).await?;
/// let raw = queue.blocking_pop("toWorker").await?;
/// ```
#[derive(Default)]
pub struct InMemoryWorkQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Arc<Notify>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 残っている件数（テスト・デバッグ用）
    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }
}

/// LRANGE と同じ規則で [start, stop] を実際の添字範囲に直す
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().await;
            queues.entry(queue.to_string()).or_default().push_back(payload);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            {
                let mut queues = self.queues.lock().await;
                if let Some(payload) = queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Ok(payload);
                }
                // ロックを持ったまま待機登録してから解放する
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    async fn range(
        &self,
        queue: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, QueueError> {
        let queues = self.queues.lock().await;
        let Some(items) = queues.get(queue) else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = resolve_range(items.len(), start, stop) else {
            return Ok(Vec::new());
        };
        Ok(items.range(start..=stop).cloned().collect())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
