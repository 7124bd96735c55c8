use std::time::Duration;

use super::*;

#[test]
fn first_delay_equals_initial_backoff() {
    let mut policy = BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(30), 2.0);
    assert_eq!(policy.next_delay(), Duration::from_millis(500));
}

#[test]
fn delay_grows_by_multiplier_each_attempt() {
    let mut policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(30), 2.0);
    assert_eq!(policy.next_delay(), Duration::from_millis(100));
    assert_eq!(policy.next_delay(), Duration::from_millis(200));
    assert_eq!(policy.next_delay(), Duration::from_millis(400));
}

#[test]
fn delay_is_capped_at_max() {
    let mut policy = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(15), 2.0);
    policy.next_delay();
    assert_eq!(policy.next_delay(), Duration::from_secs(15));
}

#[test]
fn reset_returns_to_initial_backoff() {
    let mut policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(30), 2.0);
    policy.next_delay();
    policy.next_delay();
    policy.reset();
    assert_eq!(policy.attempts(), 0);
    assert_eq!(policy.next_delay(), Duration::from_millis(100));
}

#[test]
fn attempts_counts_calls_to_next_delay() {
    let mut policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_secs(1), 2.0);
    policy.next_delay();
    policy.next_delay();
    policy.next_delay();
    assert_eq!(policy.attempts(), 3);
}
