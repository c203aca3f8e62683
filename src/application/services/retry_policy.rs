//! Spacing between attempts of a failed job.
//!
//! The queue never sleeps on a failed job; it records the earliest time the
//! job may be claimed again (`run_at`) and lets a later drain cycle pick it up.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Factor applied per further attempt
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

/// Retried jobs become eligible on the very next drain cycle.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn exponential(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            multiplier: 2.0,
            max_backoff,
        }
    }

    /// Delay after the `attempts`-th failed attempt (1-based).
    pub fn backoff_duration(&self, attempts: i32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let exponent = (attempts.max(1) - 1).min(30);
        let backoff = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = backoff.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn next_run_at(&self, now: DateTime<Utc>, attempts: i32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff_duration(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(now)
    }
}
