use std::time::Duration;

use crate::config::ExecutionConfig;
use crate::engine::error::ExecutionError;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.retry_delay_ms))
    }

    /// `attempt` is 1-based and refers to the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, error: &ExecutionError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}
