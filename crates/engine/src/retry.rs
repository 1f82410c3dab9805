//! Bounded exponential-backoff schedule shared by the workflows that talk
//! to external collaborators.

use std::time::Duration;

/// Retry schedule for transient external failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before the caller gives up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
        }
    }
}
