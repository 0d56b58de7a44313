//! Exponential backoff for the accept loop
//!
//! Accept errors such as running out of file descriptors tend to repeat; the
//! listener sleeps a growing delay between attempts and resets once an
//! accept succeeds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Highest exponent applied to the base delay
const MAX_EXPONENT: u32 = 10;

/// Delay for a given attempt number (0-indexed), capped at `max_delay_ms`.
///
/// # Example
///
/// ```
/// use sni_proxy::utils::backoff::exponential_backoff;
/// use std::time::Duration;
///
/// assert_eq!(exponential_backoff(0, 10, 1000), Duration::from_millis(10));
/// assert_eq!(exponential_backoff(3, 10, 1000), Duration::from_millis(80));
/// assert_eq!(exponential_backoff(9, 10, 1000), Duration::from_millis(1000));
/// ```
pub fn exponential_backoff(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    let delay_ms = base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.min(MAX_EXPONENT)))
        .min(max_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Counts consecutive failures and hands out the matching delay.
#[derive(Debug, Default)]
pub struct BackoffCounter {
    failures: AtomicU32,
}

impl BackoffCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            failures: AtomicU32::new(0),
        }
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&self, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
        let attempt = self
            .failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or(u32::MAX);
        exponential_backoff(attempt, base_delay_ms, max_delay_ms)
    }

    /// Forget previous failures
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Consecutive failures recorded since the last reset
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}
