//! End-to-end decision scenarios through the public API.

use resource_throttle::infrastructure::mocks::{MockClock, RecordingSink};
use resource_throttle::{
    ActionKind, CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardEventKind,
    RateLimitAction, RateLimitContext, RateLimitRule, RateLimiter, RuleEngine, RulePattern, Scope,
    TokenBucket, TokenBucketConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ctx(resource: &str) -> RateLimitContext {
    RateLimitContext::new(resource).unwrap()
}

#[test]
fn two_immediate_requests_pass_and_third_waits_one_second() {
    let now = Instant::now();
    let mut bucket = TokenBucket::new(TokenBucketConfig::per_second(2, 1.0), now);

    assert!(bucket.consume(1, now));
    assert!(bucket.consume(1, now));
    assert!(!bucket.consume(1, now));
    assert_eq!(bucket.config().retry_after(), Duration::from_millis(1000));

    // Same through the facade
    let limiter = RateLimiter::builder()
        .with_rule(RateLimitRule::new(
            "a",
            RulePattern::literal("op"),
            TokenBucketConfig::per_second(2, 1.0),
        ))
        .build()
        .unwrap();

    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    let third = limiter.check_rate_limit(&ctx("op"));
    assert!(!third.allowed);
    assert_eq!(third.retry_after, Some(Duration::from_millis(1000)));
    assert_eq!(third.rule_id(), Some("a"));
}

#[test]
fn retry_delay_follows_refill_interval() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiter::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_rule(RateLimitRule::new(
            "half-second",
            RulePattern::literal("op"),
            TokenBucketConfig::new(1, 2.0, Duration::from_millis(500)),
        ))
        .build()
        .unwrap();

    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    let rejected = limiter.check_rate_limit(&ctx("op"));
    assert!(!rejected.allowed);
    assert_eq!(rejected.retry_after, Some(Duration::from_millis(250)));

    // One interval later the bucket is full again
    clock.advance(Duration::from_millis(500));
    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
}

#[test]
fn breaker_opens_recovers_and_closes() {
    let clock = MockClock::new(Instant::now());
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::new(3, Duration::from_millis(5000), 1),
        Arc::new(clock.clone()),
    );

    for _ in 0..3 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.is_allowed());

    clock.advance(Duration::from_millis(5000));
    assert!(breaker.is_allowed());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[test]
fn users_get_independent_budgets() {
    let limiter = RateLimiter::builder()
        .with_rule(
            RateLimitRule::new(
                "api-user",
                RulePattern::regex(r"^api\."),
                TokenBucketConfig::per_second(5, 5.0),
            )
            .with_scope(Scope::User),
        )
        .build()
        .unwrap();

    let alice = ctx("api.search").with_user("alice");
    let bob = ctx("api.search").with_user("bob");

    for _ in 0..5 {
        assert!(limiter.check_rate_limit(&alice).allowed);
    }
    assert!(!limiter.check_rate_limit(&alice).allowed);

    for remaining in (0..5).rev() {
        let result = limiter.check_rate_limit(&bob);
        assert!(result.allowed);
        assert_eq!(result.tokens_remaining, Some(remaining));
    }
    assert!(!limiter.check_rate_limit(&bob).allowed);
}

#[test]
fn empty_rule_set_allows_everything() {
    let limiter = RateLimiter::builder()
        .with_rule(RateLimitRule::new(
            "tight",
            RulePattern::literal(""),
            TokenBucketConfig::per_second(1, 1.0),
        ))
        .build()
        .unwrap();
    limiter.check_rate_limit(&ctx("x"));
    assert!(!limiter.check_rate_limit(&ctx("x")).allowed);

    limiter.update_rules(vec![]).unwrap();

    for resource in ["x", "api.search", "anything/at/all"] {
        let result = limiter.check_rate_limit(&ctx(resource));
        assert!(result.allowed);
        assert!(result.matched_rule.is_none());
        assert!(result.retry_after.is_none());
    }
}

#[test]
fn higher_priority_rule_decides() {
    let engine = RuleEngine::with_rules(vec![
        RateLimitRule::new("p10", RulePattern::literal("api"), TokenBucketConfig::per_second(1, 1.0))
            .with_priority(10),
        RateLimitRule::new("p90", RulePattern::literal("api"), TokenBucketConfig::per_second(1, 1.0))
            .with_priority(90),
    ])
    .unwrap();

    for _ in 0..10 {
        assert_eq!(engine.match_rule("api.v1").unwrap().id, "p90");
    }
}

#[test]
fn rejections_escalate_to_open_circuit() {
    let clock = MockClock::new(Instant::now());
    let sink = RecordingSink::new();
    let limiter = RateLimiter::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sink(Arc::new(sink.clone()))
        .with_rule(
            RateLimitRule::new(
                "upload",
                RulePattern::literal("upload"),
                TokenBucketConfig::per_second(1, 1.0),
            )
            .with_breaker(CircuitBreakerConfig::new(2, Duration::from_secs(10), 1))
            .with_action(RateLimitAction::new(ActionKind::Log, 0.0)),
        )
        .build()
        .unwrap();

    assert!(limiter.check_rate_limit(&ctx("upload")).allowed);
    assert!(!limiter.check_rate_limit(&ctx("upload")).allowed);
    let second_rejection = limiter.check_rate_limit(&ctx("upload"));
    assert!(!second_rejection.allowed);
    assert_eq!(second_rejection.actions_triggered, vec![ActionKind::Log]);
    assert_eq!(sink.count_kind(GuardEventKind::CircuitOpened), 1);

    // Open circuit rejects without touching the bucket
    let blocked = limiter.check_rate_limit(&ctx("upload"));
    assert!(blocked.is_circuit_open());
    assert_eq!(blocked.actions_triggered, vec![ActionKind::CircuitBreak]);
    assert_eq!(blocked.retry_after, Some(Duration::from_secs(10)));
    assert_eq!(
        limiter.bucket_stats("global:upload").unwrap().total_requests,
        3
    );

    // After recovery the trial request succeeds and closes the circuit
    clock.advance(Duration::from_secs(10));
    assert!(limiter.check_rate_limit(&ctx("upload")).allowed);
    assert_eq!(
        limiter.breaker_stats("upload").unwrap().state,
        CircuitState::Closed
    );
    assert_eq!(sink.count_kind(GuardEventKind::CircuitRejected), 1);
}

#[test]
fn lazy_refill_restores_budget_over_time() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiter::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_rule(RateLimitRule::new(
            "r",
            RulePattern::literal("op"),
            TokenBucketConfig::new(3, 1.0, Duration::from_millis(100)),
        ))
        .build()
        .unwrap();

    for _ in 0..3 {
        assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    }
    assert!(!limiter.check_rate_limit(&ctx("op")).allowed);

    clock.advance(Duration::from_millis(150));
    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    assert!(!limiter.check_rate_limit(&ctx("op")).allowed);

    // The leftover 50ms counts toward the next token
    clock.advance(Duration::from_millis(50));
    assert!(limiter.check_rate_limit(&ctx("op")).allowed);
}

#[test]
fn burst_allowance_extends_budget_once() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiter::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_rule(RateLimitRule::new(
            "r",
            RulePattern::literal("op"),
            TokenBucketConfig::per_second(2, 1.0).with_burst_allowance(2),
        ))
        .build()
        .unwrap();

    for _ in 0..4 {
        assert!(limiter.check_rate_limit(&ctx("op")).allowed);
    }
    assert!(!limiter.check_rate_limit(&ctx("op")).allowed);

    let stats = limiter.bucket_stats("global:op").unwrap();
    assert_eq!(stats.tokens, 0.0);
    assert_eq!(stats.burst_tokens_used, 2.0);
}

#[test]
fn bucket_balances_stay_in_bounds() {
    let config = TokenBucketConfig::new(5, 1.5, Duration::from_millis(40)).with_burst_allowance(3);
    let start = Instant::now();
    let mut bucket = TokenBucket::new(config, start);
    let mut now = start;
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

    for _ in 0..2_000 {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        now += Duration::from_millis((seed >> 33) % 60);
        let want = ((seed >> 20) % 4) as u32 + 1;

        let before = bucket.available();
        let allowed = bucket.consume(want, now);
        if !allowed {
            // A rejection never spends
            assert!(bucket.available() >= before);
        }

        assert!(bucket.tokens() >= 0.0);
        assert!(bucket.tokens() <= 5.0);
        assert!(bucket.burst_tokens_used() >= 0.0);
        assert!(bucket.burst_tokens_used() <= 3.0);
    }
}
