use sni_proxy::utils::{BackoffCounter, exponential_backoff};
use std::time::Duration;

#[test]
fn test_exponential_backoff_doubles() {
    assert_eq!(exponential_backoff(0, 10, 1000), Duration::from_millis(10));
    assert_eq!(exponential_backoff(1, 10, 1000), Duration::from_millis(20));
    assert_eq!(exponential_backoff(2, 10, 1000), Duration::from_millis(40));
}

#[test]
fn test_exponential_backoff_max_delay() {
    let delay = exponential_backoff(20, 100, 1000);
    assert_eq!(delay, Duration::from_millis(1000));
}

#[test]
fn test_exponential_backoff_exponent_capped() {
    // 2^10 * 1ms, later attempts do not grow further
    assert_eq!(exponential_backoff(10, 1, u64::MAX), Duration::from_millis(1024));
    assert_eq!(exponential_backoff(50, 1, u64::MAX), Duration::from_millis(1024));
}

#[test]
fn test_exponential_backoff_no_overflow() {
    let delay = exponential_backoff(u32::MAX, u64::MAX, u64::MAX);
    assert_eq!(delay, Duration::from_millis(u64::MAX));
}

#[test]
fn test_backoff_counter() {
    let counter = BackoffCounter::new();
    assert_eq!(counter.failures(), 0);

    assert_eq!(counter.next_delay(10, 1000), Duration::from_millis(10));
    assert_eq!(counter.next_delay(10, 1000), Duration::from_millis(20));
    assert_eq!(counter.next_delay(10, 1000), Duration::from_millis(40));
    assert_eq!(counter.failures(), 3);

    counter.reset();
    assert_eq!(counter.failures(), 0);
    assert_eq!(counter.next_delay(10, 1000), Duration::from_millis(10));
}

#[test]
fn test_backoff_counter_caps() {
    let counter = BackoffCounter::default();
    for _ in 0..30 {
        counter.next_delay(10, 1000);
    }
    assert_eq!(counter.next_delay(10, 1000), Duration::from_millis(1000));
}
