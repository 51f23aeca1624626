//! Per-job state machine of the worker loop.

use serde::{Deserialize, Serialize};

/// Job state within one worker iteration.
///
/// State transitions:
/// - WaitForJob -> FetchInput -> RunTransform -> PublishOutputs -> Done
/// - any non-terminal state -> Failed
///
/// Done / Failed are terminal for the job only; the loop always goes back to
/// WaitForJob afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Blocked on the queue pop.
    WaitForJob,

    /// Copying the input artifact to local staging.
    FetchInput,

    /// External transform is running.
    RunTransform,

    /// Uploading produced parts.
    PublishOutputs,

    Done,

    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Next state on success of the current step.
    pub fn advance(self) -> JobState {
        match self {
            JobState::WaitForJob => JobState::FetchInput,
            JobState::FetchInput => JobState::RunTransform,
            JobState::RunTransform => JobState::PublishOutputs,
            JobState::PublishOutputs => JobState::Done,
            JobState::Done | JobState::Failed => JobState::WaitForJob,
        }
    }
}
