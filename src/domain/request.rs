//! Per-call request descriptors and outcomes.

use crate::domain::rule::{ActionKind, RateLimitRule};
use crate::error::{RateLimitError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Caller details carried alongside a request.
///
/// Only used for diagnostics; decisions never depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Remote address of the caller
    pub ip_address: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
    /// Origin of the request (host, page or subsystem)
    pub origin: Option<String>,
}

/// Describes one operation to be rate limited.
///
/// # Example
/// ```
/// use resource_throttle::RateLimitContext;
///
/// let ctx = RateLimitContext::new("api.search")
///     .unwrap()
///     .with_user("alice")
///     .with_session("s-42");
///
/// assert_eq!(ctx.resource_id(), "api.search");
/// assert_eq!(ctx.user_id(), Some("alice"));
///
/// assert!(RateLimitContext::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitContext {
    resource_id: String,
    user_id: Option<String>,
    session_id: Option<String>,
    metadata: RequestMetadata,
}

impl RateLimitContext {
    /// Create a context for `resource_id`.
    ///
    /// # Errors
    /// Returns `RateLimitError::EmptyResourceId` if `resource_id` is empty.
    pub fn new(resource_id: impl Into<String>) -> Result<Self> {
        let resource_id = resource_id.into();
        if resource_id.is_empty() {
            return Err(RateLimitError::EmptyResourceId);
        }
        Ok(Self {
            resource_id,
            user_id: None,
            session_id: None,
            metadata: RequestMetadata::default(),
        })
    }

    /// Attach the calling user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the calling session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The operation being limited.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// The calling user, if known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The calling session, if known.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Caller metadata.
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }
}

/// Outcome of a rate limit check.
///
/// `retry_after` is `Some` exactly when `allowed` is `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// The rule that decided, if any matched
    pub matched_rule: Option<Arc<RateLimitRule>>,
    /// Whole tokens left in the bucket that was consulted
    pub tokens_remaining: Option<u32>,
    /// Suggested wait before retrying a rejected operation
    pub retry_after: Option<Duration>,
    /// Actions that fired for a rejected operation
    pub actions_triggered: Vec<ActionKind>,
}

impl RateLimitResult {
    /// No rule matched: the operation is not limited.
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            matched_rule: None,
            tokens_remaining: None,
            retry_after: None,
            actions_triggered: Vec::new(),
        }
    }

    /// The bucket admitted the operation.
    pub fn allowed(rule: Arc<RateLimitRule>, tokens_remaining: u32) -> Self {
        Self {
            allowed: true,
            matched_rule: Some(rule),
            tokens_remaining: Some(tokens_remaining),
            retry_after: None,
            actions_triggered: Vec::new(),
        }
    }

    /// The rule's circuit breaker is open; the bucket was not consulted.
    pub fn circuit_open(rule: Arc<RateLimitRule>, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            matched_rule: Some(rule),
            tokens_remaining: None,
            retry_after: Some(retry_after),
            actions_triggered: vec![ActionKind::CircuitBreak],
        }
    }

    /// The bucket rejected the operation.
    pub fn rejected(
        rule: Arc<RateLimitRule>,
        tokens_remaining: u32,
        retry_after: Duration,
        actions_triggered: Vec<ActionKind>,
    ) -> Self {
        Self {
            allowed: false,
            matched_rule: Some(rule),
            tokens_remaining: Some(tokens_remaining),
            retry_after: Some(retry_after),
            actions_triggered,
        }
    }

    /// Id of the matched rule.
    pub fn rule_id(&self) -> Option<&str> {
        self.matched_rule.as_deref().map(|rule| rule.id.as_str())
    }

    /// Whether the rejection came from an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        !self.allowed && self.tokens_remaining.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::TokenBucketConfig;
    use crate::domain::rule::RulePattern;

    fn rule() -> Arc<RateLimitRule> {
        Arc::new(RateLimitRule::new(
            "r1",
            RulePattern::literal("api"),
            TokenBucketConfig::per_second(1, 1.0),
        ))
    }

    #[test]
    fn test_retry_after_only_on_rejection() {
        let unlimited = RateLimitResult::unlimited();
        assert!(unlimited.allowed);
        assert!(unlimited.retry_after.is_none());
        assert!(unlimited.rule_id().is_none());

        let allowed = RateLimitResult::allowed(rule(), 3);
        assert!(allowed.retry_after.is_none());
        assert_eq!(allowed.rule_id(), Some("r1"));

        let rejected = RateLimitResult::rejected(rule(), 0, Duration::from_secs(1), vec![]);
        assert_eq!(rejected.retry_after, Some(Duration::from_secs(1)));
        assert!(!rejected.is_circuit_open());

        let open = RateLimitResult::circuit_open(rule(), Duration::from_millis(10));
        assert!(open.is_circuit_open());
        assert_eq!(open.actions_triggered, vec![ActionKind::CircuitBreak]);
    }

    #[test]
    fn test_context_builders() {
        let meta = RequestMetadata {
            ip_address: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        let ctx = RateLimitContext::new("upload")
            .unwrap()
            .with_metadata(meta.clone());

        assert_eq!(ctx.metadata(), &meta);
        assert_eq!(ctx.user_id(), None);
        assert_eq!(ctx.session_id(), None);
    }

    #[test]
    fn test_empty_resource_rejected() {
        assert_eq!(
            RateLimitContext::new(String::new()),
            Err(RateLimitError::EmptyResourceId)
        );
    }
}
