//! Declarative rate limit rules.
//!
//! A rule binds a resource pattern to a bucket policy, an optional circuit
//! breaker and a list of escalation actions. Rules are plain data; the
//! [`RuleEngine`](crate::RuleEngine) validates and compiles them.

use crate::domain::breaker::CircuitBreakerConfig;
use crate::domain::bucket::TokenBucketConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a rule selects resource identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    /// Matches when the resource id contains this substring
    Literal(String),
    /// Matches when this regular expression matches the resource id
    Regex(String),
}

impl RulePattern {
    /// Substring pattern.
    pub fn literal(pattern: impl Into<String>) -> Self {
        RulePattern::Literal(pattern.into())
    }

    /// Regular expression pattern. Compiled when the rule is installed.
    pub fn regex(pattern: impl Into<String>) -> Self {
        RulePattern::Regex(pattern.into())
    }

    /// The raw pattern text.
    pub fn as_str(&self) -> &str {
        match self {
            RulePattern::Literal(p) | RulePattern::Regex(p) => p,
        }
    }
}

impl fmt::Display for RulePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePattern::Literal(p) => write!(f, "{}", p),
            RulePattern::Regex(p) => write!(f, "/{}/", p),
        }
    }
}

/// Dimension along which a rule's budget is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One budget shared by every caller
    #[default]
    Global,
    /// One budget per user id
    User,
    /// One budget per session id
    Session,
    /// One budget per resource id
    Resource,
}

impl Scope {
    /// Lowercase name used as the bucket key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::User => "user",
            Scope::Session => "session",
            Scope::Resource => "resource",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host should do with a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Record the rejection in the log
    Log,
    /// Ask the host to delay the operation before retrying
    Delay(Duration),
    /// Reject the operation outright
    Reject,
    /// Trip the rule's circuit breaker
    CircuitBreak,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Log => f.write_str("log"),
            ActionKind::Delay(d) => write!(f, "delay({}ms)", d.as_millis()),
            ActionKind::Reject => f.write_str("reject"),
            ActionKind::CircuitBreak => f.write_str("circuit_break"),
        }
    }
}

/// An escalation step that fires once the rejection rate reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitAction {
    /// What to do
    pub kind: ActionKind,
    /// Rejection rate in percent (0–100) at which the action fires
    pub threshold: f64,
}

impl RateLimitAction {
    /// Create an action.
    pub fn new(kind: ActionKind, threshold: f64) -> Self {
        Self { kind, threshold }
    }

    /// Whether the action fires at `rejection_rate` (0.0 to 1.0).
    pub fn fires_at(&self, rejection_rate: f64) -> bool {
        self.threshold <= rejection_rate * 100.0
    }
}

/// A declarative rate limiting policy.
///
/// # Example
/// ```
/// use resource_throttle::{
///     ActionKind, CircuitBreakerConfig, RateLimitAction, RateLimitRule, RulePattern, Scope,
///     TokenBucketConfig,
/// };
///
/// let rule = RateLimitRule::new(
///     "api-per-user",
///     RulePattern::regex(r"^api\."),
///     TokenBucketConfig::per_second(5, 5.0),
/// )
/// .with_scope(Scope::User)
/// .with_priority(90)
/// .with_breaker(CircuitBreakerConfig::default())
/// .with_action(RateLimitAction::new(ActionKind::Log, 0.0));
///
/// assert!(rule.enabled);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRule {
    /// Unique rule id
    pub id: String,
    /// Resource selector
    pub pattern: RulePattern,
    /// Budget partitioning
    pub scope: Scope,
    /// Bucket policy for every key this rule produces
    pub bucket: TokenBucketConfig,
    /// Optional breaker guarding this rule
    pub breaker: Option<CircuitBreakerConfig>,
    /// Escalation actions evaluated on rejection
    pub actions: Vec<RateLimitAction>,
    /// Higher priority rules are matched first
    pub priority: i32,
    /// Disabled rules never match
    pub enabled: bool,
}

impl RateLimitRule {
    /// Create an enabled, global-scope rule with priority 0.
    pub fn new(id: impl Into<String>, pattern: RulePattern, bucket: TokenBucketConfig) -> Self {
        Self {
            id: id.into(),
            pattern,
            scope: Scope::Global,
            bucket,
            breaker: None,
            actions: Vec::new(),
            priority: 0,
            enabled: true,
        }
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Guard the rule with a circuit breaker.
    pub fn with_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Some(config);
        self
    }

    /// Append an action.
    pub fn with_action(mut self, action: RateLimitAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Enable or disable the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_threshold() {
        let action = RateLimitAction::new(ActionKind::Reject, 50.0);
        assert!(!action.fires_at(0.49));
        assert!(action.fires_at(0.5));
        assert!(action.fires_at(1.0));

        assert!(RateLimitAction::new(ActionKind::Log, 0.0).fires_at(0.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(RulePattern::regex("^api").to_string(), "/^api/");
        assert_eq!(RulePattern::literal("upload").to_string(), "upload");
        assert_eq!(Scope::Session.to_string(), "session");
        assert_eq!(
            ActionKind::Delay(Duration::from_millis(250)).to_string(),
            "delay(250ms)"
        );
    }

    #[test]
    fn test_builder_defaults() {
        let rule = RateLimitRule::new(
            "r",
            RulePattern::literal("x"),
            TokenBucketConfig::per_second(1, 1.0),
        );
        assert_eq!(rule.scope, Scope::Global);
        assert_eq!(rule.priority, 0);
        assert!(rule.enabled);
        assert!(rule.breaker.is_none());
        assert!(rule.actions.is_empty());

        let rule = rule.with_enabled(false).with_priority(-3);
        assert!(!rule.enabled);
        assert_eq!(rule.priority, -3);
    }
}
