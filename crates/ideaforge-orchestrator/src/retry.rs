use serde::{Deserialize, Serialize};

/// Bounded retry budget shared by the development and publishing phases.
///
/// `attempt_count` on a record counts failed attempts. A record may be
/// attempted again as long as it has failed fewer than `max_attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed attempts after which a record is FAILED.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` attempts; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Whether a record that has failed `attempt_count` times may be retried.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Attempts left before the budget is spent.
    pub fn remaining(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }
}
