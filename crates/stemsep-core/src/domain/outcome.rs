//! JobReport: what one worker iteration did.
//!
//! ワーカーから投入側へのフィードバック経路は無いので、これはログと
//! テストのためだけの記録です。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::JobError;
use super::ids::JobId;
use super::state::JobState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// None when the envelope could not be decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    /// Done or Failed.
    pub state: JobState,

    /// State the job was in when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<JobState>,

    /// Output keys uploaded during this attempt (also on partial failure).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub published: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn done(job_id: JobId, published: Vec<String>) -> Self {
        Self {
            job_id: Some(job_id),
            state: JobState::Done,
            failed_at: None,
            published,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(err: &JobError) -> Self {
        let published = match err {
            JobError::PublishPartialFailure { published, .. } => published.clone(),
            _ => Vec::new(),
        };
        Self {
            job_id: err.job_id().cloned(),
            state: JobState::Failed,
            failed_at: Some(err.stage()),
            published,
            error: Some(err.to_string()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_keeps_published_keys() {
        let id = JobId::parse("abc").unwrap();
        let err = JobError::PublishPartialFailure {
            id: id.clone(),
            published: vec!["abc-vocals.mp3".into()],
            failed: vec!["abc-bass.mp3".into()],
        };
        let report = JobReport::failed(&err);
        assert_eq!(report.job_id, Some(id));
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_at, Some(JobState::PublishOutputs));
        assert_eq!(report.published, vec!["abc-vocals.mp3".to_string()]);
        assert!(!report.is_done());
    }
}
