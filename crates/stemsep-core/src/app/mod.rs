//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Connections**: 依存サービスへの接続（固定間隔リトライ + bucket 作成）
//! - **PipelineBuilder**: サービスとワーカーの構築とワイヤリング
//! - **SubmissionService**: 入力の保存とキュー投入
//! - **WorkerLoop**: ジョブ実行ループ（pop→fetch→transform→publish）
//! - **RetrievalService**: 出力の取得・削除、キュー参照、ヘルスチェック

pub mod builder;
pub mod connect;
pub mod retrieval;
pub mod retry;
pub mod status;
pub mod submission;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, PipelineBuilder, Services};
pub use self::connect::{ConnectError, Connections, retry_until_ready};
pub use self::retrieval::{PendingEntry, RetrievalService};
pub use self::retry::RetryPolicy;
pub use self::status::{WorkerCounts, WorkerStats};
pub use self::submission::{SubmissionService, SubmitRequest};
pub use self::worker_loop::{WorkerLoop, WorkerOptions};
