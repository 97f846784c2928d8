//! Serializable limiter configuration.
//!
//! The host loads these types from whatever source it uses (file, env,
//! remote settings) and hands them to
//! [`RateLimiterBuilder::from_config`](crate::RateLimiterBuilder::from_config).
//! Durations are plain millisecond counts so every format can express them.

use crate::domain::breaker::CircuitBreakerConfig;
use crate::domain::bucket::{TokenBucketConfig, DEFAULT_BURST_RECOVERY_RATIO};
use crate::domain::rule::{ActionKind, RateLimitAction, RateLimitRule, RulePattern, Scope};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Evict buckets and breakers idle for this long
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Cap on live buckets; `null` for no cap
    #[serde(default = "default_max_buckets")]
    pub max_buckets: Option<usize>,

    /// Bucket policy for rules that do not define their own
    #[serde(default)]
    pub default_bucket: BucketConfigSpec,

    /// Rules in declaration order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            max_buckets: default_max_buckets(),
            default_bucket: BucketConfigSpec::default(),
            rules: Vec::new(),
        }
    }
}

impl LimiterConfig {
    /// The idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Build the domain rules, filling in the default bucket where needed.
    pub fn to_rules(&self) -> Vec<RateLimitRule> {
        self.rules
            .iter()
            .map(|rule| rule.to_rule(&self.default_bucket))
            .collect()
    }
}

fn default_idle_timeout_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_max_buckets() -> Option<usize> {
    Some(crate::infrastructure::builder::DEFAULT_MAX_BUCKETS)
}

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfigSpec {
    /// Maximum regular tokens
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens added per refill interval
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// Refill interval in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,

    /// Starting balance; defaults to `capacity`
    #[serde(default)]
    pub initial_tokens: Option<u32>,

    /// Extra tokens available beyond capacity
    #[serde(default)]
    pub burst_allowance: u32,

    /// Share of refilled tokens that also restores burst headroom
    #[serde(default = "default_burst_recovery_ratio")]
    pub burst_recovery_ratio: f64,
}

impl Default for BucketConfigSpec {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            refill_interval_ms: default_refill_interval_ms(),
            initial_tokens: None,
            burst_allowance: 0,
            burst_recovery_ratio: default_burst_recovery_ratio(),
        }
    }
}

impl BucketConfigSpec {
    /// Convert to the domain config. Validation happens when rules install.
    pub fn to_config(&self) -> TokenBucketConfig {
        let mut config = TokenBucketConfig::new(
            self.capacity,
            self.refill_rate,
            Duration::from_millis(self.refill_interval_ms),
        )
        .with_burst_allowance(self.burst_allowance)
        .with_burst_recovery_ratio(self.burst_recovery_ratio);
        if let Some(tokens) = self.initial_tokens {
            config = config.with_initial_tokens(tokens);
        }
        config
    }
}

fn default_capacity() -> u32 {
    100
}

fn default_refill_rate() -> f64 {
    10.0
}

fn default_refill_interval_ms() -> u64 {
    1000
}

fn default_burst_recovery_ratio() -> f64 {
    DEFAULT_BURST_RECOVERY_RATIO
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfigSpec {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open, in milliseconds
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Trial calls while half-open
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfigSpec {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl From<BreakerConfigSpec> for CircuitBreakerConfig {
    fn from(spec: BreakerConfigSpec) -> Self {
        CircuitBreakerConfig::new(
            spec.failure_threshold,
            Duration::from_millis(spec.recovery_timeout_ms),
            spec.half_open_max_calls,
        )
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_ms() -> u64 {
    30_000
}

fn default_half_open_max_calls() -> u32 {
    1
}

/// What an action does, tagged by `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKindSpec {
    /// Log the rejection
    Log,
    /// Ask the host to wait `delay_ms`
    Delay {
        /// Suggested delay in milliseconds
        delay_ms: u64,
    },
    /// Reject outright
    Reject,
    /// Trip the rule's breaker
    CircuitBreak,
}

/// One escalation action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// The action
    #[serde(flatten)]
    pub kind: ActionKindSpec,

    /// Rejection rate in percent at which the action fires
    #[serde(default)]
    pub threshold: f64,
}

impl From<ActionSpec> for RateLimitAction {
    fn from(spec: ActionSpec) -> Self {
        let kind = match spec.kind {
            ActionKindSpec::Log => ActionKind::Log,
            ActionKindSpec::Delay { delay_ms } => ActionKind::Delay(Duration::from_millis(delay_ms)),
            ActionKindSpec::Reject => ActionKind::Reject,
            ActionKindSpec::CircuitBreak => ActionKind::CircuitBreak,
        };
        RateLimitAction::new(kind, spec.threshold)
    }
}

/// One rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique rule id
    pub id: String,

    /// Literal substring, or a regular expression when `regex` is set
    pub pattern: String,

    /// Treat `pattern` as a regular expression
    #[serde(default)]
    pub regex: bool,

    /// Budget partitioning
    #[serde(default)]
    pub scope: Scope,

    /// Bucket policy; falls back to the limiter's default bucket
    #[serde(default)]
    pub bucket: Option<BucketConfigSpec>,

    /// Optional breaker
    #[serde(default)]
    pub breaker: Option<BreakerConfigSpec>,

    /// Escalation actions
    #[serde(default)]
    pub actions: Vec<ActionSpec>,

    /// Higher matches first
    #[serde(default)]
    pub priority: i32,

    /// Disabled rules never match
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleConfig {
    /// Convert to a domain rule.
    pub fn to_rule(&self, default_bucket: &BucketConfigSpec) -> RateLimitRule {
        let pattern = if self.regex {
            RulePattern::regex(self.pattern.as_str())
        } else {
            RulePattern::literal(self.pattern.as_str())
        };
        let bucket = self.bucket.as_ref().unwrap_or(default_bucket).to_config();

        let mut rule = RateLimitRule::new(self.id.as_str(), pattern, bucket)
            .with_scope(self.scope)
            .with_priority(self.priority)
            .with_enabled(self.enabled);
        if let Some(breaker) = self.breaker {
            rule = rule.with_breaker(breaker.into());
        }
        rule.actions = self.actions.iter().copied().map(RateLimitAction::from).collect();
        rule
    }
}

fn default_enabled() -> bool {
    true
}
