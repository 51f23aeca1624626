//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryWorkQueue / InMemoryObjectStore**: 開発・テスト用
//! - **RedisWorkQueue**: Redis list（RPUSH / BLPOP / LRANGE）
//! - **S3ObjectStore**: MinIO / S3（path-style）
//! - **LocalObjectStore**: ローカルディレクトリ
//! - **CommandTransform**: 外部コマンド（既定は Demucs）

pub mod command_transform;
pub mod inmem_queue;
pub mod inmem_store;
pub mod local_store;
pub mod redis_queue;
pub mod s3_store;

pub use self::command_transform::CommandTransform;
pub use self::inmem_queue::InMemoryWorkQueue;
pub use self::inmem_store::InMemoryObjectStore;
pub use self::local_store::LocalObjectStore;
pub use self::redis_queue::RedisWorkQueue;
pub use self::s3_store::S3ObjectStore;
