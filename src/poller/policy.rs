//! Poll retry policy
//!
//! Waits grow geometrically from `initial_wait` by `backoff_factor` and are
//! capped at `max_wait`; at most `max_attempts` status queries are made.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for status polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Wait after the first unfinished query (default: 5s)
    pub initial_wait: Duration,

    /// Multiplier applied after every wait (default: 2)
    pub backoff_factor: u32,

    /// Cap on a single wait (default: 60s)
    pub max_wait: Duration,

    /// Status queries before giving up (default: 15)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(5),
            backoff_factor: 2,
            max_wait: Duration::from_secs(60),
            max_attempts: 15,
        }
    }
}

impl RetryPolicy {
    /// Validate the policy bounds
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if self.max_attempts == 0 {
            return Err(PolicyValidationError::NoAttempts);
        }
        if self.backoff_factor == 0 {
            return Err(PolicyValidationError::FactorTooSmall);
        }
        if self.initial_wait > self.max_wait {
            return Err(PolicyValidationError::InitialExceedsMax {
                initial: self.initial_wait,
                max: self.max_wait,
            });
        }
        Ok(())
    }

    /// Wait following `current`: `min(current * factor, max_wait)`
    pub fn next_wait(&self, current: Duration) -> Duration {
        current
            .checked_mul(self.backoff_factor)
            .map_or(self.max_wait, |next| next.min(self.max_wait))
    }

    /// Wait after the `attempt`-th query (1-based): `min(initial * factor^(attempt-1), max_wait)`
    pub fn wait_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.backoff_factor
            .checked_pow(exponent)
            .and_then(|multiplier| self.initial_wait.checked_mul(multiplier))
            .map_or(self.max_wait, |wait| wait.min(self.max_wait))
    }

    /// Upper bound of the total time spent sleeping in one sequence
    pub fn total_wait_budget(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|n| self.wait_for_attempt(n))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Policy validation errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyValidationError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("backoff_factor must be at least 1")]
    FactorTooSmall,

    #[error("initial wait {initial:?} exceeds max wait {max:?}")]
    InitialExceedsMax { initial: Duration, max: Duration },
}
