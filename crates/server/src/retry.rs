//! Bounded retry policy for eventually-consistent storage operations.

use std::time::Duration;

/// A bounded retry policy: a fixed number of attempts, each followed by a
/// fixed settling delay. No exponential backoff and no overall deadline
/// beyond the configured attempts.
///
/// The deletion coordinator is the only user; everything else in the system
/// fails fast and propagates.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    settle_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. Attempts are clamped to at least one.
    pub fn new(max_attempts: u32, settle_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            settle_delay,
        }
    }

    /// Number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep out the settling delay.
    pub async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(150))
    }
}
