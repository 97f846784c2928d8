//! Priority-ordered rule matching.
//!
//! The active rule set is an immutable slice behind an `RwLock`. Updates build
//! and validate a complete replacement first and then swap the pointer, so a
//! concurrent matcher sees either the old set or the new one.

use crate::domain::request::RateLimitContext;
use crate::domain::rule::{RateLimitRule, RulePattern, Scope};
use crate::error::{RateLimitError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Key segment used when a user or session scoped rule sees no id.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug)]
enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn compile(rule: &RateLimitRule) -> Result<Self> {
        match &rule.pattern {
            RulePattern::Literal(text) => Ok(Matcher::Literal(text.clone())),
            RulePattern::Regex(source) => Regex::new(source)
                .map(Matcher::Regex)
                .map_err(|e| RateLimitError::policy(&rule.id, format!("invalid pattern: {e}"))),
        }
    }

    fn is_match(&self, resource_id: &str) -> bool {
        match self {
            Matcher::Literal(text) => resource_id.contains(text.as_str()),
            Matcher::Regex(regex) => regex.is_match(resource_id),
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    rule: Arc<RateLimitRule>,
    matcher: Matcher,
}

/// Validate and compile a rule list into matching order.
fn compile(rules: Vec<RateLimitRule>) -> Result<Arc<[CompiledRule]>> {
    let mut seen = HashSet::with_capacity(rules.len());
    let mut compiled = Vec::with_capacity(rules.len());

    for rule in rules {
        if rule.id.is_empty() {
            return Err(RateLimitError::policy("", "rule id must not be empty"));
        }
        if !seen.insert(rule.id.clone()) {
            return Err(RateLimitError::policy(&rule.id, "duplicate rule id"));
        }
        rule.bucket
            .validate()
            .map_err(|reason| RateLimitError::policy(&rule.id, reason))?;
        if let Some(breaker) = &rule.breaker {
            breaker
                .validate()
                .map_err(|reason| RateLimitError::policy(&rule.id, reason))?;
        }

        let matcher = Matcher::compile(&rule)?;
        compiled.push(CompiledRule {
            rule: Arc::new(rule),
            matcher,
        });
    }

    // Stable: equal priorities keep declaration order
    compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
    Ok(compiled.into())
}

/// Matches resource ids against the active rule set.
///
/// # Example
/// ```
/// use resource_throttle::{RateLimitRule, RuleEngine, RulePattern, TokenBucketConfig};
///
/// let engine = RuleEngine::with_rules(vec![
///     RateLimitRule::new("broad", RulePattern::literal("api"), TokenBucketConfig::per_second(100, 10.0))
///         .with_priority(10),
///     RateLimitRule::new("search", RulePattern::regex(r"^api\.search"), TokenBucketConfig::per_second(5, 1.0))
///         .with_priority(90),
/// ])
/// .unwrap();
///
/// assert_eq!(engine.match_rule("api.search.users").unwrap().id, "search");
/// assert_eq!(engine.match_rule("api.upload").unwrap().id, "broad");
/// assert!(engine.match_rule("static.css").is_none());
/// ```
#[derive(Debug)]
pub struct RuleEngine {
    rules: RwLock<Arc<[CompiledRule]>>,
}

impl RuleEngine {
    /// Create an engine with no rules; nothing matches.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Create an engine with an initial rule set.
    ///
    /// # Errors
    /// Returns `RateLimitError::PolicyMismatch` if any rule is invalid.
    pub fn with_rules(rules: Vec<RateLimitRule>) -> Result<Self> {
        Ok(Self {
            rules: RwLock::new(compile(rules)?),
        })
    }

    fn snapshot(&self) -> Arc<[CompiledRule]> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Find the highest priority enabled rule matching `resource_id`.
    pub fn match_rule(&self, resource_id: &str) -> Option<Arc<RateLimitRule>> {
        self.snapshot()
            .iter()
            .find(|compiled| compiled.rule.enabled && compiled.matcher.is_match(resource_id))
            .map(|compiled| Arc::clone(&compiled.rule))
    }

    /// Build the bucket key for `rule` and `ctx`.
    ///
    /// The key alone identifies a bucket: two requests share a budget exactly
    /// when their keys are equal.
    pub fn derive_bucket_key(rule: &RateLimitRule, ctx: &RateLimitContext) -> String {
        match rule.scope {
            Scope::Global => format!("global:{}", rule.id),
            Scope::User => format!("user:{}:{}", ctx.user_id().unwrap_or(ANONYMOUS), rule.id),
            Scope::Session => format!(
                "session:{}:{}",
                ctx.session_id().unwrap_or(ANONYMOUS),
                rule.id
            ),
            Scope::Resource => format!("resource:{}:{}", ctx.resource_id(), rule.id),
        }
    }

    /// Replace the whole rule set.
    ///
    /// # Errors
    /// Returns `RateLimitError::PolicyMismatch` if any rule is invalid; the
    /// active set is left untouched in that case.
    pub fn update_rules(&self, rules: Vec<RateLimitRule>) -> Result<()> {
        let compiled = compile(rules)?;
        let count = compiled.len();
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = compiled;
        debug!(rules = count, "rule set replaced");
        Ok(())
    }

    /// Active rules in matching order.
    pub fn rules(&self) -> Vec<Arc<RateLimitRule>> {
        self.snapshot()
            .iter()
            .map(|compiled| Arc::clone(&compiled.rule))
            .collect()
    }

    /// Number of installed rules, enabled or not.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if no rules are installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
