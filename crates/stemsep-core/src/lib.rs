//! stemsep-core
//!
//! Core building blocks for the stem-separation pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, envelope, naming, state, outcome, errors）
//! - **ports**: 抽象化レイヤー（WorkQueue, ObjectStore, Transform, IdGenerator）
//! - **app**: アプリケーションロジック（connect, builder, submission, worker_loop, retrieval）
//! - **impls**: 実装（Redis, S3/MinIO, ローカル, in-memory, 外部コマンド）
//! - **config**: 設定の読み込み
//! - **observability**: tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
