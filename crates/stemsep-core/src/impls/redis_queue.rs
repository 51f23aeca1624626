//! RedisWorkQueue - Redis list による配送キュー（本番用）
//!
//! - push: RPUSH（末尾に追加）
//! - blocking_pop: BLPOP timeout=0（先頭を取り出すまで無期限に待つ）
//! - range: LRANGE（消費しない）
//!
//! BLPOP はコネクションを占有するので、pop 専用のコネクションを 1 本持ち、
//! push/range/ping 用の多重化コネクションとは分けています。
//! pop 用はエラーが出たときだけ捨てて、次の pop で張り直します。

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::ports::{QueueError, WorkQueue};

pub struct RedisWorkQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    pop_conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisWorkQueue {
    /// `redis_url` は `redis://host:port` 形式
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| QueueError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            conn,
            pop_conn: Mutex::new(None),
        })
    }
}

async fn pop_on(conn: &mut MultiplexedConnection, queue: &str) -> redis::RedisResult<String> {
    loop {
        // timeout 0 は無期限待ち。nil が返るのは想定外だが、その場合は待ち直す
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(0)
            .query_async(conn)
            .await?;
        if let Some((_key, payload)) = popped {
            return Ok(payload);
        }
    }
}

fn command_error(e: redis::RedisError) -> QueueError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        QueueError::Unavailable(e.to_string())
    } else {
        QueueError::OperationFailed(e.to_string())
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError> {
        let mut slot = self.pop_conn.lock().await;
        // 途中で future が捨てられたら BLPOP ごと接続も捨てる
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| QueueError::Unavailable(e.to_string()))?,
        };

        let payload = pop_on(&mut conn, queue).await.map_err(command_error)?;
        *slot = Some(conn);
        Ok(payload)
    }

    async fn range(
        &self,
        queue: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("LRANGE")
            .arg(queue)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }
}
