//! Transform port - 外部の分離処理
//!
//! 入力ファイルと出力ディレクトリを受け取り、ジョブ ID で決まるサブパスに
//! 固定の出力ファイル群を書く実行ファイルです。成功/失敗しか区別しません。

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::JobId;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to start transform: {0}")]
    Spawn(#[from] io::Error),

    /// `code` is None when the process was killed by a signal.
    #[error("transform exited unsuccessfully (status {code:?})")]
    Exit { code: Option<i32> },
}

#[async_trait]
pub trait Transform: Send + Sync {
    /// Run to completion against `input`, writing under `output_dir`.
    async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), TransformError>;

    /// Directory holding the parts produced for `id`.
    fn job_output_dir(&self, output_dir: &Path, id: &JobId) -> PathBuf;
}
