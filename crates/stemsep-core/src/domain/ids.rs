//! Job identifiers.
//!
//! JobId は投入ごとに一意な不透明 ID です。
//! - 呼び出し側が指定する場合: 文字種を検証してそのまま使う
//! - サーバ側で生成する場合: 128-bit 乱数の 16 進表現（32 文字）
//!
//! ID はオブジェクトキー（`{id}.mp3`）とワーカーのステージング先パスの
//! 両方に埋め込まれるため、パス区切りや空白は受け付けません。

use serde::{Deserialize, Serialize};
use std::fmt;

/// ID の最大長（bytes）
pub const MAX_JOB_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobIdError {
    #[error("job id must not be empty")]
    Empty,

    #[error("job id is longer than {MAX_JOB_ID_LEN} bytes")]
    TooLong,

    #[error("job id contains invalid character {0:?} (allowed: ASCII alphanumerics, '-', '_')")]
    InvalidChar(char),
}

/// Identifier of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// 呼び出し側から受け取った文字列を検証して JobId にする
    pub fn parse(s: impl Into<String>) -> Result<Self, JobIdError> {
        let s = s.into();
        if s.is_empty() {
            return Err(JobIdError::Empty);
        }
        if s.len() > MAX_JOB_ID_LEN {
            return Err(JobIdError::TooLong);
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(JobIdError::InvalidChar(c));
        }
        Ok(Self(s))
    }

    /// 128-bit の値から 16 進 32 文字の ID を作る
    pub fn from_random(value: u128) -> Self {
        Self(format!("{value:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = JobIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
