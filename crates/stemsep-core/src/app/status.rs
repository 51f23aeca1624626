//! Status - ワーカーの処理件数
//!
//! ワーカーは 1 プロセス 1 ループなので、集計もプロセスローカルです。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::{JobReport, JobState};

/// Point-in-time snapshot of [`WorkerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCounts {
    pub done: u64,
    pub failed: u64,
    /// 失敗のうち、envelope が読めなかったもの
    pub malformed: u64,
}

impl WorkerCounts {
    pub fn processed(&self) -> u64 {
        self.done + self.failed
    }
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    done: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
}

impl WorkerStats {
    pub fn record(&self, report: &JobReport) {
        if report.is_done() {
            self.done.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.failed.fetch_add(1, Ordering::Relaxed);
        if report.failed_at == Some(JobState::WaitForJob) {
            self.malformed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> WorkerCounts {
        WorkerCounts {
            done: self.done.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnvelopeError, JobError, JobId};

    #[test]
    fn counts_follow_reports() {
        let stats = WorkerStats::default();
        let id = JobId::parse("abc").unwrap();

        stats.record(&JobReport::done(id.clone(), vec![]));
        stats.record(&JobReport::failed(&JobError::InputUnavailable {
            id,
            reason: "not found".into(),
        }));
        stats.record(&JobReport::failed(&JobError::from(EnvelopeError {
            reason: "expected value".into(),
        })));

        let counts = stats.snapshot();
        assert_eq!(
            counts,
            WorkerCounts {
                done: 1,
                failed: 2,
                malformed: 1
            }
        );
        assert_eq!(counts.processed(), 3);
    }
}
