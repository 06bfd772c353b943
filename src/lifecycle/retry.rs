use std::time::Duration;

/// Spawn attempts per start request before settling in `Error`.
pub const MAX_START_ATTEMPTS: u32 = 3;
/// Pause between a failed attempt and the next one.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Poll cadence while waiting on another caller's operation.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Polls before a waiting caller gives up (about 3s in total).
pub const WAIT_POLL_LIMIT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub wait_poll_interval: Duration,
    pub wait_poll_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_START_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            wait_poll_interval: WAIT_POLL_INTERVAL,
            wait_poll_limit: WAIT_POLL_LIMIT,
        }
    }
}

impl RetryPolicy {
    /// Total time a caller waits for an operation someone else started.
    pub fn wait_ceiling(&self) -> Duration {
        self.wait_poll_interval * self.wait_poll_limit
    }
}

/// Remaining automatic attempts. Never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self {
            remaining: max,
            max,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset(&mut self) {
        self.remaining = self.max;
    }

    /// Spend one attempt and return what is left.
    pub fn consume(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
