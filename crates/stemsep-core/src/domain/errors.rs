//! Errors - エラー型と分類
//!
//! - SubmitError: 投入側へ同期的に返す
//! - JobError: ワーカー側。そのジョブの試行を終わらせるだけで、ログにしか出ない
//! - RetrievalError: 取得・削除・キュー参照

use super::envelope::EnvelopeError;
use super::ids::{JobId, JobIdError};
use super::naming::UnknownStem;
use super::state::JobState;

/// ErrorKind は運用上の分類
///
/// - Permanent: 呼び出し側の入力や壊れたメッセージ（リトライ無意味）
/// - Transient: 依存サービスの一時的な障害（投入全体のリトライは安全）
/// - Infrastructure: 外部実行ファイルやローカル環境の失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Transient,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::Validation(_) | SubmitError::PayloadTooLarge { .. } => {
                ErrorKind::Permanent
            }
            SubmitError::DependencyUnavailable(_) => ErrorKind::Transient,
        }
    }
}

impl From<JobIdError> for SubmitError {
    fn from(e: JobIdError) -> Self {
        SubmitError::Validation(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    MalformedEnvelope(#[from] EnvelopeError),

    #[error("input missing/unreadable for job {id}: {reason}")]
    InputUnavailable { id: JobId, reason: String },

    #[error("transform failed for job {id}: {reason}")]
    TransformFailure { id: JobId, reason: String },

    #[error("publish incomplete for job {id}: published {published:?}, failed {failed:?}")]
    PublishPartialFailure {
        id: JobId,
        published: Vec<String>,
        failed: Vec<String>,
    },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::MalformedEnvelope(_) => ErrorKind::Permanent,
            JobError::InputUnavailable { .. } | JobError::PublishPartialFailure { .. } => {
                ErrorKind::Transient
            }
            JobError::TransformFailure { .. } => ErrorKind::Infrastructure,
        }
    }

    /// 失敗した時点の状態
    pub fn stage(&self) -> JobState {
        match self {
            JobError::MalformedEnvelope(_) => JobState::WaitForJob,
            JobError::InputUnavailable { .. } => JobState::FetchInput,
            JobError::TransformFailure { .. } => JobState::RunTransform,
            JobError::PublishPartialFailure { .. } => JobState::PublishOutputs,
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobError::MalformedEnvelope(_) => None,
            JobError::InputUnavailable { id, .. }
            | JobError::TransformFailure { id, .. }
            | JobError::PublishPartialFailure { id, .. } => Some(id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::Validation(_) | RetrievalError::NotFound { .. } => {
                ErrorKind::Permanent
            }
            RetrievalError::DependencyUnavailable(_) => ErrorKind::Transient,
        }
    }
}

impl From<JobIdError> for RetrievalError {
    fn from(e: JobIdError) -> Self {
        RetrievalError::Validation(e.to_string())
    }
}

impl From<UnknownStem> for RetrievalError {
    fn from(e: UnknownStem) -> Self {
        RetrievalError::Validation(e.to_string())
    }
}
