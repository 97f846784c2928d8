//! Rate limiter facade.
//!
//! Ties the rule engine, the per-rule circuit breakers and the per-key token
//! buckets together into one decision per request.

use crate::application::metrics::{Metrics, MetricsSnapshot};
use crate::application::ports::{EventSink, Storage};
use crate::application::registry::{BreakerEntry, BreakerRegistry, BucketEntry, BucketRegistry};
use crate::application::rules::RuleEngine;
use crate::domain::breaker::{BreakerStats, CircuitBreakerConfig};
use crate::domain::bucket::{BucketStats, TokenBucketConfig};
use crate::domain::event::{GuardEvent, GuardEventKind};
use crate::domain::request::{RateLimitContext, RateLimitResult};
use crate::domain::rule::{ActionKind, RateLimitRule};
use crate::error::Result;
use crate::infrastructure::storage::{BreakerStore, BucketStore};
use std::collections::HashMap;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Buckets and breakers untouched for this long are evicted by sweeps.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Observability snapshot across the whole limiter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregateStats {
    /// Installed rules
    pub rules: usize,
    /// Live buckets
    pub buckets: usize,
    /// Live circuit breakers
    pub breakers: usize,
    /// Breakers currently open
    pub open_circuits: usize,
    /// Requests seen by live buckets
    pub total_requests: u64,
    /// Requests rejected by live buckets
    pub rejected_requests: u64,
    /// Lifetime decision counters
    pub metrics: MetricsSnapshot,
}

impl AggregateStats {
    /// Rejection rate across live buckets (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rejected_requests as f64 / self.total_requests as f64
        }
    }
}

struct LimiterInner<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    engine: RuleEngine,
    buckets: BucketRegistry<BS>,
    breakers: BreakerRegistry<CS>,
    metrics: Metrics,
    sink: Arc<dyn EventSink>,
    idle_timeout: Duration,
    disposed: AtomicBool,
}

/// Decides whether each request may proceed.
///
/// Cloning is cheap: every clone shares the same rules and state.
///
/// # Example
/// ```
/// use resource_throttle::{RateLimitContext, RateLimitRule, RateLimiter, RulePattern, TokenBucketConfig};
///
/// let limiter = RateLimiter::builder()
///     .with_rules(vec![RateLimitRule::new(
///         "uploads",
///         RulePattern::literal("upload"),
///         TokenBucketConfig::per_second(2, 1.0),
///     )])
///     .build()
///     .unwrap();
///
/// let ctx = RateLimitContext::new("files.upload").unwrap();
/// assert!(limiter.check_rate_limit(&ctx).allowed);
/// assert!(limiter.check_rate_limit(&ctx).allowed);
///
/// let rejected = limiter.check_rate_limit(&ctx);
/// assert!(!rejected.allowed);
/// assert!(rejected.retry_after.is_some());
/// ```
pub struct RateLimiter<BS = BucketStore, CS = BreakerStore>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    inner: Arc<LimiterInner<BS, CS>>,
}

impl<BS, CS> Clone for RateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<BS, CS> std::fmt::Debug for RateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rules", &self.inner.engine.len())
            .field("buckets", &self.inner.buckets.len())
            .field("breakers", &self.inner.breakers.len())
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl<BS, CS> RateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    /// Assemble a limiter from its parts.
    ///
    /// Most callers should use [`RateLimiter::builder`] instead.
    pub fn new(
        engine: RuleEngine,
        buckets: BucketRegistry<BS>,
        breakers: BreakerRegistry<CS>,
        metrics: Metrics,
        sink: Arc<dyn EventSink>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                engine,
                buckets,
                breakers,
                metrics,
                sink,
                idle_timeout,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_live(&self, operation: &str) {
        if self.inner.disposed.load(Ordering::Acquire) {
            panic!("RateLimiter::{operation} called after dispose");
        }
    }

    // A check already past `ensure_live` when `dispose` runs may recreate a
    // bucket or breaker after the clear. Dropping it here leaves no state
    // behind a disposed limiter.
    fn release_if_disposed(&self) {
        if self.inner.disposed.load(Ordering::Acquire) {
            self.inner.buckets.clear();
            self.inner.breakers.clear();
        }
    }

    /// Decide whether the operation described by `ctx` may proceed.
    ///
    /// Requests no rule matches are allowed. Rejections are ordinary results
    /// carrying a suggested retry delay and the actions that fired.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn check_rate_limit(&self, ctx: &RateLimitContext) -> RateLimitResult {
        self.ensure_live("check_rate_limit");
        let inner = &*self.inner;
        let resource_id = ctx.resource_id();

        let Some(rule) = inner.engine.match_rule(resource_id) else {
            inner.metrics.record_unmatched();
            trace!(resource_id, "no rule matched");
            return RateLimitResult::unlimited();
        };

        let breaker = rule
            .breaker
            .map(|config| inner.breakers.get_or_create(&rule.id, config));

        if let Some(breaker) = &breaker {
            if !breaker.is_allowed() {
                inner.metrics.record_circuit_rejection();
                trace!(resource_id, rule_id = %rule.id, "circuit open");
                self.notify(GuardEvent::new(
                    GuardEventKind::CircuitRejected,
                    rule.id.as_str(),
                    resource_id,
                    0.0,
                ));
                let retry_after = breaker.retry_after();
                self.release_if_disposed();
                return RateLimitResult::circuit_open(Arc::clone(&rule), retry_after);
            }
        }

        let key = RuleEngine::derive_bucket_key(&rule, ctx);
        let (allowed, tokens_remaining, rejection_rate) =
            inner
                .buckets
                .with_bucket(key, &rule.id, &rule.bucket, |bucket, now| {
                    let allowed = bucket.consume(1, now);
                    (
                        allowed,
                        bucket.tokens_remaining(),
                        bucket.stats().rejection_rate(),
                    )
                });
        self.release_if_disposed();

        if allowed {
            if let Some(breaker) = &breaker {
                breaker.record_success();
            }
            inner.metrics.record_allowed();
            trace!(resource_id, rule_id = %rule.id, tokens_remaining, "allowed");
            return RateLimitResult::allowed(rule, tokens_remaining);
        }

        inner.metrics.record_rejected();
        let mut opened = breaker
            .as_ref()
            .map_or(false, |breaker| breaker.record_failure());

        let actions: Vec<ActionKind> = rule
            .actions
            .iter()
            .filter(|action| action.fires_at(rejection_rate))
            .map(|action| action.kind)
            .collect();

        for action in &actions {
            match action {
                ActionKind::Log => warn!(
                    resource_id,
                    rule_id = %rule.id,
                    rejection_rate,
                    "rate limit exceeded"
                ),
                ActionKind::CircuitBreak => {
                    if let Some(breaker) = &breaker {
                        opened |= breaker.trip();
                    }
                }
                ActionKind::Delay(_) | ActionKind::Reject => {}
            }
        }

        trace!(resource_id, rule_id = %rule.id, rejection_rate, "rejected");
        self.notify(GuardEvent::new(
            GuardEventKind::RateLimited,
            rule.id.as_str(),
            resource_id,
            rejection_rate,
        ));
        if opened {
            warn!(rule_id = %rule.id, resource_id, "circuit opened");
            self.notify(GuardEvent::new(
                GuardEventKind::CircuitOpened,
                rule.id.as_str(),
                resource_id,
                rejection_rate,
            ));
        }

        let retry_after = rule.bucket.retry_after();
        RateLimitResult::rejected(rule, tokens_remaining, retry_after, actions)
    }

    // A misbehaving sink must never change the decision.
    fn notify(&self, event: GuardEvent) {
        let sink = &self.inner.sink;
        if panic::catch_unwind(panic::AssertUnwindSafe(|| sink.notify(&event))).is_err() {
            warn!(kind = %event.kind, rule_id = %event.rule_id, "event sink panicked");
        }
    }

    /// Replace the rule set.
    ///
    /// State of rules that survive by id is kept and picks up the new
    /// configuration; state of removed rules is dropped.
    ///
    /// # Errors
    /// Returns `RateLimitError::PolicyMismatch` if any rule is invalid. The
    /// previous rule set stays active in that case.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn update_rules(&self, rules: Vec<RateLimitRule>) -> Result<()> {
        self.ensure_live("update_rules");
        let inner = &*self.inner;
        inner.engine.update_rules(rules)?;

        let active = inner.engine.rules();
        let bucket_configs: HashMap<&str, &TokenBucketConfig> = active
            .iter()
            .map(|rule| (rule.id.as_str(), &rule.bucket))
            .collect();
        let breaker_configs: HashMap<&str, CircuitBreakerConfig> = active
            .iter()
            .filter_map(|rule| rule.breaker.map(|config| (rule.id.as_str(), config)))
            .collect();

        let pruned_buckets = inner.buckets.sync_rules(&bucket_configs);
        let pruned_breakers = inner.breakers.sync_rules(&breaker_configs);
        debug!(
            rules = active.len(),
            pruned_buckets, pruned_breakers, "rules updated"
        );
        Ok(())
    }

    /// Snapshot totals across all live state.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn stats(&self) -> AggregateStats {
        self.ensure_live("stats");
        let inner = &*self.inner;
        let totals = inner.buckets.totals();
        AggregateStats {
            rules: inner.engine.len(),
            buckets: totals.buckets,
            breakers: inner.breakers.len(),
            open_circuits: inner.breakers.open_count(),
            total_requests: totals.total_requests,
            rejected_requests: totals.rejected_requests,
            metrics: inner.metrics.snapshot(),
        }
    }

    /// Release all buckets and breakers.
    ///
    /// Every later call on this limiter or any clone panics. A check already
    /// in flight still returns its decision, but drops any state it created.
    ///
    /// # Panics
    /// Panics if the limiter has already been disposed.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            panic!("RateLimiter::dispose called after dispose");
        }
        let buckets = self.inner.buckets.len();
        let breakers = self.inner.breakers.len();
        self.inner.buckets.clear();
        self.inner.breakers.clear();
        info!(buckets, breakers, "rate limiter disposed");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Evict buckets and breakers idle for longer than the idle timeout.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn evict_idle(&self) -> usize {
        self.ensure_live("evict_idle");
        self.sweep()
    }

    fn sweep(&self) -> usize {
        let inner = &*self.inner;
        let evicted = inner.buckets.evict_idle(inner.idle_timeout)
            + inner.breakers.evict_idle(inner.idle_timeout);
        if evicted > 0 {
            inner.metrics.record_evictions(evicted);
            debug!(evicted, "idle state evicted");
        }
        evicted
    }

    /// Drop all bucket and breaker state and zero the counters. Rules stay.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn reset(&self) {
        self.ensure_live("reset");
        self.inner.buckets.clear();
        self.inner.breakers.clear();
        self.inner.metrics.reset();
        debug!("rate limiter reset");
    }

    /// Snapshot the bucket stored under `key`, if any.
    pub fn bucket_stats(&self, key: &str) -> Option<BucketStats> {
        self.ensure_live("bucket_stats");
        self.inner.buckets.stats(key)
    }

    /// Snapshot the breaker of `rule_id`, if one has been created.
    pub fn breaker_stats(&self, rule_id: &str) -> Option<BreakerStats> {
        self.ensure_live("breaker_stats");
        self.inner.breakers.stats(rule_id)
    }

    /// Active rules in matching order.
    pub fn rules(&self) -> Vec<Arc<RateLimitRule>> {
        self.ensure_live("rules");
        self.inner.engine.rules()
    }

    /// Lifetime decision counters.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.ensure_live("bucket_count");
        self.inner.buckets.len()
    }

    /// Number of live circuit breakers.
    pub fn breaker_count(&self) -> usize {
        self.ensure_live("breaker_count");
        self.inner.breakers.len()
    }

    /// Idle time after which state is evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    pub(crate) fn downgrade(&self) -> WeakRateLimiter<BS, CS> {
        WeakRateLimiter {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle used by background tasks.
pub(crate) struct WeakRateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    inner: Weak<LimiterInner<BS, CS>>,
}

impl<BS, CS> WeakRateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone,
    CS: Storage<String, BreakerEntry> + Clone,
{
    /// Run one idle sweep.
    ///
    /// Returns `None` once every strong handle is gone or the limiter has
    /// been disposed.
    pub(crate) fn sweep(&self) -> Option<usize> {
        let limiter = RateLimiter {
            inner: self.inner.upgrade()?,
        };
        if limiter.is_disposed() {
            return None;
        }
        Some(limiter.sweep())
    }
}
