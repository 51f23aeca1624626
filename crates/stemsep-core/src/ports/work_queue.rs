//! WorkQueue port - 配送キュー（Redis または InMemory）
//!
//! キューは不透明な文字列（エンコード済み envelope）だけを運びます。
//! - push は末尾に追加
//! - blocking_pop は先頭を取り出す。要素が来るまで無期限に待つ
//! - pop は 1 回につき 1 件だけ取り除く（同じ envelope が 2 つのワーカーに渡らない）

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError>;

    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError>;

    /// Inspect without consuming. `start`/`stop` are inclusive and may be
    /// negative (counted from the tail), like LRANGE.
    async fn range(&self, queue: &str, start: isize, stop: isize)
    -> Result<Vec<String>, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}
