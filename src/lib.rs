//! # resource-throttle
//!
//! In-process rate limiting for named operations: token buckets per key,
//! circuit breakers per rule, and priority-ordered rules that decide which
//! budget a request draws from.
//!
//! Every call to [`RateLimiter::check_rate_limit`] returns a decision
//! immediately. Refill is lazy, computed from elapsed time on the calling
//! thread, so there are no timers and nothing blocks beyond short per-key
//! critical sections.
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_throttle::{
//!     ActionKind, CircuitBreakerConfig, RateLimitAction, RateLimitContext, RateLimitRule,
//!     RateLimiter, RulePattern, Scope, TokenBucketConfig,
//! };
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::builder()
//!     .with_rule(
//!         RateLimitRule::new(
//!             "login",
//!             RulePattern::regex(r"^auth\.login$"),
//!             TokenBucketConfig::per_second(5, 1.0),
//!         )
//!         .with_scope(Scope::User)
//!         .with_priority(90)
//!         .with_breaker(CircuitBreakerConfig::new(10, Duration::from_secs(30), 1))
//!         .with_action(RateLimitAction::new(ActionKind::Log, 50.0)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let ctx = RateLimitContext::new("auth.login").unwrap().with_user("alice");
//! let result = limiter.check_rate_limit(&ctx);
//! assert!(result.allowed);
//! assert_eq!(result.tokens_remaining, Some(4));
//! ```
//!
//! ## How a decision is made
//!
//! 1. The [`RuleEngine`] picks the highest priority enabled rule whose pattern
//!    matches the resource id. No match means the request is allowed.
//! 2. If the rule has a circuit breaker and it is open, the request is
//!    rejected without touching any bucket.
//! 3. The rule's scope turns the request into a bucket key
//!    (`global:{rule}`, `user:{user}:{rule}`, `session:{session}:{rule}` or
//!    `resource:{resource}:{rule}`) and one token is consumed from that bucket.
//! 4. A rejection counts as a breaker failure, carries a retry delay, and fires
//!    every rule action whose threshold the bucket's rejection rate has reached.
//!
//! Rejections are values, not errors. [`RateLimitError`] only reports invalid
//! rules and builder settings.
//!
//! ## Token buckets
//!
//! A bucket credits `refill_rate` tokens per whole elapsed `refill_interval`
//! and never exceeds `capacity`. Fractional interval progress is kept for the
//! next call. An optional burst allowance lets a key spend beyond its regular
//! budget; that headroom recovers by `burst_recovery_ratio` of every refill.
//!
//! ## Circuit breakers
//!
//! Closed → Open after `failure_threshold` consecutive failures (each success
//! forgives one). Open → HalfOpen once `recovery_timeout` elapses; up to
//! `half_open_max_calls` trials are admitted and that many successes close the
//! circuit. Any half-open failure reopens it.
//!
//! ## Memory
//!
//! State is created on first use and removed by:
//! - [`RateLimiter::evict_idle`] (or the periodic sweeper, feature `async`),
//!   for entries idle longer than the idle timeout (24h by default)
//! - the bucket cap (`with_max_buckets`), which evicts the least recently
//!   used bucket when full
//! - [`RateLimiter::update_rules`], which drops state of removed rules
//!
//! ## Features
//!
//! - `async`: [`RateLimiter::spawn_sweeper`] runs idle eviction on a Tokio task
//! - `test-helpers`: exposes `MockClock` and `RecordingSink`

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

pub mod error;

// Re-export commonly used types for convenience
pub use domain::{
    breaker::{BreakerStats, CircuitBreakerConfig, CircuitState},
    bucket::{BucketStats, TokenBucket, TokenBucketConfig, DEFAULT_BURST_RECOVERY_RATIO},
    event::{GuardEvent, GuardEventKind},
    request::{RateLimitContext, RateLimitResult, RequestMetadata},
    rule::{ActionKind, RateLimitAction, RateLimitRule, RulePattern, Scope},
};

pub use application::{
    circuit_breaker::CircuitBreaker,
    limiter::{AggregateStats, RateLimiter, DEFAULT_IDLE_TIMEOUT},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, EventSink, EvictionCandidate, EvictionPolicy, LastAccess, Storage},
    registry::{BreakerEntry, BreakerRegistry, BucketEntry, BucketRegistry},
    rules::RuleEngine,
};

#[cfg(feature = "async")]
pub use application::sweeper::SweeperHandle;

pub use infrastructure::{
    builder::{RateLimiterBuilder, DEFAULT_MAX_BUCKETS},
    clock::SystemClock,
    config::{ActionKindSpec, ActionSpec, BreakerConfigSpec, BucketConfigSpec, LimiterConfig, RuleConfig},
    eviction::LruEviction,
    sink::{NoopSink, TracingSink},
    storage::{BreakerStore, BucketStore, ShardedStorage},
};

pub use error::{RateLimitError, Result};
