//! Retry policy: decides reconnect delays.

use std::time::Duration;

/// Fixed-delay retry policy for dependency connections.
///
/// Long-running processes wait for Redis/MinIO as long as it takes
/// (`max_attempts = None`). One-shot commands cap the attempts so they fail
/// instead of hanging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub delay: Duration,

    /// Give up after this many attempts. None = retry forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Fixed delay, unbounded attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

impl Default for RetryPolicy {
    /// 3 seconds, forever.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}
