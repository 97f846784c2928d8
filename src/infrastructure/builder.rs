//! Construction of a fully wired [`RateLimiter`].

use crate::application::limiter::{RateLimiter, DEFAULT_IDLE_TIMEOUT};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EventSink};
use crate::application::registry::{BreakerRegistry, BucketEntry, BucketRegistry};
use crate::application::rules::RuleEngine;
use crate::domain::rule::RateLimitRule;
use crate::error::{RateLimitError, Result};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::LimiterConfig;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::sink::NoopSink;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default cap on live buckets.
pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

/// Builder for constructing a [`RateLimiter`].
///
/// Defaults: no rules, system clock, no event sink, 24h idle timeout and at
/// most [`DEFAULT_MAX_BUCKETS`] live buckets.
#[derive(Debug)]
pub struct RateLimiterBuilder {
    rules: Vec<RateLimitRule>,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn EventSink>>,
    idle_timeout: Duration,
    max_buckets: Option<usize>,
}

impl RateLimiterBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            clock: None,
            sink: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_buckets: Some(DEFAULT_MAX_BUCKETS),
        }
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self {
            rules: config.to_rules(),
            clock: None,
            sink: None,
            idle_timeout: config.idle_timeout(),
            max_buckets: config.max_buckets,
        }
    }

    /// Replace the initial rule set.
    pub fn with_rules(mut self, rules: Vec<RateLimitRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Append one rule.
    pub fn with_rule(mut self, rule: RateLimitRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Use a custom clock. Mainly for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receive a notification on every rejection and breaker opening.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Evict buckets and breakers idle for this long.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Cap the number of live buckets, evicting the least recently used.
    pub fn with_max_buckets(mut self, max: usize) -> Self {
        self.max_buckets = Some(max);
        self
    }

    /// Remove the bucket cap. Memory then grows with the number of active keys.
    pub fn with_unlimited_buckets(mut self) -> Self {
        self.max_buckets = None;
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `RateLimitError::ZeroMaxBuckets` or `ZeroIdleTimeout` for
    /// invalid limits, and `PolicyMismatch` if any rule is invalid.
    pub fn build(self) -> Result<RateLimiter> {
        if self.max_buckets == Some(0) {
            return Err(RateLimitError::ZeroMaxBuckets);
        }
        if self.idle_timeout.is_zero() {
            return Err(RateLimitError::ZeroIdleTimeout);
        }

        let rule_count = self.rules.len();
        let engine = RuleEngine::with_rules(self.rules)?;
        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(NoopSink));

        let mut bucket_storage: ShardedStorage<String, BucketEntry> =
            ShardedStorage::new().with_metrics(metrics.clone());
        if let Some(max) = self.max_buckets {
            bucket_storage = bucket_storage.with_eviction_policy(Arc::new(LruEviction::new(max)));
        }

        let buckets = BucketRegistry::new(Arc::new(bucket_storage), Arc::clone(&clock));
        let breakers = BreakerRegistry::new(Arc::new(ShardedStorage::new()), clock);

        debug!(
            rules = rule_count,
            max_buckets = ?self.max_buckets,
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            "rate limiter built"
        );
        Ok(RateLimiter::new(
            engine,
            buckets,
            breakers,
            metrics,
            sink,
            self.idle_timeout,
        ))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a builder.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::TokenBucketConfig;
    use crate::domain::request::RateLimitContext;
    use crate::domain::rule::RulePattern;
    use crate::infrastructure::mocks::MockClock;
    use std::time::Instant;

    fn rule(id: &str) -> RateLimitRule {
        RateLimitRule::new(id, RulePattern::literal("api"), TokenBucketConfig::per_second(5, 1.0))
    }

    #[test]
    fn test_build_defaults() {
        let limiter = RateLimiter::builder().build().unwrap();
        assert_eq!(limiter.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
        assert!(limiter.rules().is_empty());
    }

    #[test]
    fn test_rejects_invalid_limits() {
        assert_eq!(
            RateLimiter::builder().with_max_buckets(0).build().unwrap_err(),
            RateLimitError::ZeroMaxBuckets
        );
        assert_eq!(
            RateLimiter::builder()
                .with_idle_timeout(Duration::ZERO)
                .build()
                .unwrap_err(),
            RateLimitError::ZeroIdleTimeout
        );
    }

    #[test]
    fn test_rejects_invalid_rules() {
        let err = RateLimiter::builder()
            .with_rule(rule("dup"))
            .with_rule(rule("dup"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RateLimitError::PolicyMismatch { .. }));
    }

    #[test]
    fn test_bucket_cap_evicts_and_counts() {
        let clock = MockClock::new(Instant::now());
        let limiter = RateLimiter::builder()
            .with_rule(rule("r").with_scope(crate::domain::rule::Scope::User))
            .with_clock(Arc::new(clock.clone()))
            .with_max_buckets(2)
            .build()
            .unwrap();

        for user in ["a", "b", "c"] {
            clock.advance(Duration::from_millis(10));
            let ctx = RateLimitContext::new("api").unwrap().with_user(user);
            assert!(limiter.check_rate_limit(&ctx).allowed);
        }

        assert_eq!(limiter.bucket_count(), 2);
        assert!(limiter.bucket_stats("user:a:r").is_none());
        assert_eq!(limiter.metrics().evicted(), 1);
    }

    #[test]
    fn test_from_config() {
        let config: LimiterConfig = serde_json::from_str(
            r#"{ "idle_timeout_ms": 5000, "max_buckets": null,
                 "rules": [ { "id": "r", "pattern": "api" } ] }"#,
        )
        .unwrap();

        let limiter = RateLimiterBuilder::from_config(&config).build().unwrap();
        assert_eq!(limiter.idle_timeout(), Duration::from_secs(5));
        assert_eq!(limiter.rules()[0].id, "r");
    }
}
