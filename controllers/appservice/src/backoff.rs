//! # Backoff
//!
//! Two delay schedules live here:
//!
//! - [`FibonacciBackoff`]: requeue delay after a failed reconcile, kept per
//!   AppService key by the dispatcher. Sequence in minutes: 1, 1, 2, 3, 5, 8,
//!   10 (max). Grows more slowly than exponential backoff, so a parent stuck
//!   on a transient error keeps being retried at a reasonable cadence.
//! - [`RetryPolicy`]: the short, bounded in-process retry used by the upsert
//!   engine when an update hits a write conflict.

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, starting from `min` twice
/// and capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Default schedule for reconciliation errors: 1m up to 10m
    #[must_use]
    pub fn for_reconcile_errors() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Reset the backoff to the initial state (after a successful reconcile)
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Bounded retry schedule for optimistic-concurrency conflicts.
///
/// `max_attempts` counts update calls, so with the default of 5 the upsert
/// engine tolerates 4 consecutive conflicts and gives up on the 5th.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based), doubling each
    /// time and capped at `max_delay`
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        std::cmp::min(self.initial_delay.saturating_mul(1u32 << shift), self.max_delay)
    }
}
