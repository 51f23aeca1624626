//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Redis, MinIO/S3, 分離処理の実行ファイル）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - キューは envelope 文字列だけを運ぶ
//! - Blob storage は入力と出力のアーティファクトの置き場
//! - 共有状態は持たない。調停はキューとストレージに任せる

pub mod id_generator;
pub mod object_store;
pub mod transform;
pub mod work_queue;

pub use self::id_generator::{IdGenerator, RandomIdGenerator};
pub use self::object_store::{ObjectInfo, ObjectStore, StoreError, ensure_bucket};
pub use self::transform::{Transform, TransformError};
pub use self::work_queue::{QueueError, WorkQueue};
