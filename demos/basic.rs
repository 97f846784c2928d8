//! Basic example: per-user login limits with a circuit breaker.
//!
//! Run with `RUST_LOG=resource_throttle=debug` to see bucket and breaker
//! lifecycle events.

use resource_throttle::{
    ActionKind, CircuitBreakerConfig, RateLimitAction, RateLimitContext, RateLimitRule,
    RateLimiter, RulePattern, Scope, TokenBucketConfig, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let limiter = RateLimiter::builder()
        .with_sink(Arc::new(TracingSink))
        .with_rule(
            RateLimitRule::new(
                "login",
                RulePattern::regex(r"^auth\.login$"),
                TokenBucketConfig::per_second(3, 1.0),
            )
            .with_scope(Scope::User)
            .with_priority(90)
            .with_breaker(CircuitBreakerConfig::new(4, Duration::from_secs(30), 1))
            .with_action(RateLimitAction::new(ActionKind::Log, 25.0))
            .with_action(RateLimitAction::new(
                ActionKind::Delay(Duration::from_millis(500)),
                50.0,
            )),
        )
        .with_rule(RateLimitRule::new(
            "api",
            RulePattern::literal("api."),
            TokenBucketConfig::per_second(100, 50.0),
        ))
        .build()
        .expect("valid rules");

    println!("=== Basic Rate Limiting Example ===\n");
    println!("Rule: 3 logins per user, refilling 1 per second\n");

    let alice = RateLimitContext::new("auth.login")
        .expect("non-empty resource")
        .with_user("alice");
    for attempt in 1..=10 {
        let result = limiter.check_rate_limit(&alice);
        println!(
            "alice attempt {attempt:>2}: allowed={} remaining={:?} retry_after={:?} actions={:?}",
            result.allowed, result.tokens_remaining, result.retry_after, result.actions_triggered
        );
    }

    println!("\nBob gets a separate bucket but shares the rule breaker:");
    let bob = RateLimitContext::new("auth.login")
        .expect("non-empty resource")
        .with_user("bob");
    let result = limiter.check_rate_limit(&bob);
    println!(
        "bob: allowed={} circuit_open={}",
        result.allowed,
        result.is_circuit_open()
    );

    println!("\nUnrelated operations are unaffected:");
    let search = RateLimitContext::new("api.search").expect("non-empty resource");
    let result = limiter.check_rate_limit(&search);
    println!(
        "api.search: allowed={} rule={:?}",
        result.allowed,
        result.rule_id()
    );

    let stats = limiter.stats();
    println!(
        "\nrules={} buckets={} breakers={} open_circuits={} rejection_rate={:.2}",
        stats.rules,
        stats.buckets,
        stats.breakers,
        stats.open_circuits,
        stats.rejection_rate()
    );
}
