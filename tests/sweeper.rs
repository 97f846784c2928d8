//! Background idle eviction.

#![cfg(feature = "async")]

use resource_throttle::infrastructure::mocks::MockClock;
use resource_throttle::{
    RateLimitContext, RateLimitError, RateLimitRule, RateLimiter, RulePattern, Scope,
    TokenBucketConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn limiter(clock: &MockClock) -> RateLimiter {
    RateLimiter::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_idle_timeout(Duration::from_secs(60))
        .with_rule(
            RateLimitRule::new(
                "api",
                RulePattern::literal("api"),
                TokenBucketConfig::per_second(5, 1.0),
            )
            .with_scope(Scope::User),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn sweeper_evicts_idle_buckets() {
    let clock = MockClock::new(Instant::now());
    let limiter = limiter(&clock);
    for user in ["a", "b", "c"] {
        let ctx = RateLimitContext::new("api").unwrap().with_user(user);
        limiter.check_rate_limit(&ctx);
    }
    assert_eq!(limiter.bucket_count(), 3);

    let handle = limiter.spawn_sweeper(Duration::from_millis(10)).unwrap();
    clock.advance(Duration::from_secs(61));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(limiter.bucket_count(), 0);
    assert_eq!(limiter.metrics().evicted(), 3);
    handle.shutdown().await;
}

#[tokio::test]
async fn sweeper_keeps_active_buckets() {
    let clock = MockClock::new(Instant::now());
    let limiter = limiter(&clock);
    let ctx = RateLimitContext::new("api").unwrap().with_user("a");
    limiter.check_rate_limit(&ctx);

    let handle = limiter.spawn_sweeper(Duration::from_millis(10)).unwrap();
    clock.advance(Duration::from_secs(30));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(limiter.bucket_count(), 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn sweeper_stops_after_dispose() {
    let clock = MockClock::new(Instant::now());
    let limiter = limiter(&clock);

    let handle = limiter.spawn_sweeper(Duration::from_millis(10)).unwrap();
    limiter.dispose();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.is_finished());
}

#[tokio::test]
async fn sweeper_stops_when_limiter_dropped() {
    let clock = MockClock::new(Instant::now());
    let limiter = limiter(&clock);

    let handle = limiter.spawn_sweeper(Duration::from_millis(10)).unwrap();
    drop(limiter);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.is_finished());
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let clock = MockClock::new(Instant::now());
    let limiter = limiter(&clock);

    let err = limiter.spawn_sweeper(Duration::ZERO).unwrap_err();
    assert_eq!(err, RateLimitError::ZeroSweepInterval);
}
