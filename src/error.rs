//! Error types for the rate limiting core.
//!
//! Rejections (rate limit exceeded, circuit open) are not errors: they are
//! ordinary [`RateLimitResult`](crate::RateLimitResult) values. Only structural
//! misuse such as an invalid rule or builder setting surfaces here.

use thiserror::Error;

/// Main error type for rate limiter construction and policy updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// A rule failed validation. The rule set it belonged to was not applied.
    #[error("rule `{rule_id}` rejected: {reason}")]
    PolicyMismatch {
        /// Id of the offending rule
        rule_id: String,
        /// Human-readable reason
        reason: String,
    },

    /// A request context was built with an empty resource id.
    #[error("resource id must not be empty")]
    EmptyResourceId,

    /// Bucket limit configured as zero.
    #[error("max_buckets must be greater than 0")]
    ZeroMaxBuckets,

    /// Idle timeout configured as zero.
    #[error("idle timeout must be greater than 0")]
    ZeroIdleTimeout,

    /// Sweeper interval configured as zero.
    #[error("sweep interval must be greater than 0")]
    ZeroSweepInterval,
}

impl RateLimitError {
    pub(crate) fn policy(rule_id: &str, reason: impl Into<String>) -> Self {
        RateLimitError::PolicyMismatch {
            rule_id: rule_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for rate limiter operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_mismatch_display() {
        let err = RateLimitError::policy("api", "capacity must be greater than 0");
        assert_eq!(
            err.to_string(),
            "rule `api` rejected: capacity must be greater than 0"
        );
    }
}
