//! Conflict retry policy for upserts
//!
//! Contains [`RetryPolicy`], which bounds how many times `put` re-runs its
//! read-modify-write attempt after losing a uniqueness race.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for conflict retry behavior
///
/// # Example
/// ```
/// use temporal_kv::retry::RetryPolicy;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(5)
///     .with_base_delay_ms(20)
///     .with_max_delay_ms(200);
/// assert_eq!(policy.max_attempts(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (0 behaves like 1)
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Create a RetryPolicy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Default attempt budget without sleeping between attempts
    pub fn no_backoff() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Effective attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether a failed attempt (1-based) should be followed by another one
    pub fn should_retry(&self, attempt: u32, err: &Error) -> bool {
        err.is_conflict() && attempt < self.max_attempts()
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Cap the shift to prevent overflow
        let shift = attempt.saturating_sub(1).min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
