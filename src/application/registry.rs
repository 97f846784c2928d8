//! Registries for per-key bucket state and per-rule breakers.
//!
//! Both registries create entries lazily on first reference and stamp every
//! access, so idle entries can be swept later. They are generic over the
//! storage port; in production both use `Arc<ShardedStorage>`.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::ports::{Clock, LastAccess, Storage};
use crate::domain::breaker::{BreakerStats, CircuitBreakerConfig, CircuitState};
use crate::domain::bucket::{BucketStats, TokenBucket, TokenBucketConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// State tracked for each bucket key.
#[derive(Debug)]
pub struct BucketEntry {
    /// The bucket itself
    pub bucket: TokenBucket,
    /// Rule that owns this key
    pub rule_id: Arc<str>,
    /// Last time a request touched the bucket
    pub last_access: Instant,
}

impl LastAccess for BucketEntry {
    fn last_access(&self) -> Instant {
        self.last_access
    }
}

/// State tracked for each rule with a breaker.
#[derive(Debug)]
pub struct BreakerEntry {
    /// Shared breaker; in-flight calls hold extra references
    pub breaker: Arc<CircuitBreaker>,
    /// Last time a request consulted the breaker
    pub last_access: Instant,
}

impl LastAccess for BreakerEntry {
    fn last_access(&self) -> Instant {
        self.last_access
    }
}

/// Totals across every live bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketTotals {
    /// Live buckets
    pub buckets: usize,
    /// Requests seen by live buckets
    pub total_requests: u64,
    /// Requests rejected by live buckets
    pub rejected_requests: u64,
}

/// Registry of token buckets keyed by derived bucket key.
#[derive(Clone)]
pub struct BucketRegistry<S>
where
    S: Storage<String, BucketEntry> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
}

impl<S> BucketRegistry<S>
where
    S: Storage<String, BucketEntry> + Clone,
{
    /// Create a registry over `storage`.
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Access or create the bucket for `key`.
    ///
    /// A new bucket is built from `config` at the current instant. The
    /// callback runs under the entry lock, so everything it does to the
    /// bucket is atomic with respect to other callers on the same key.
    pub fn with_bucket<F, R>(&self, key: String, rule_id: &str, config: &TokenBucketConfig, f: F) -> R
    where
        F: FnOnce(&mut TokenBucket, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage.with_entry_mut(
            key,
            || {
                debug!(rule_id, capacity = config.capacity, "creating bucket");
                BucketEntry {
                    bucket: TokenBucket::new(config.clone(), now),
                    rule_id: Arc::from(rule_id),
                    last_access: now,
                }
            },
            |entry| {
                entry.last_access = now;
                f(&mut entry.bucket, now)
            },
        )
    }

    /// Snapshot one bucket without creating it.
    pub fn stats(&self, key: &str) -> Option<BucketStats> {
        self.storage
            .with_entry(&key.to_string(), |entry| entry.bucket.stats())
    }

    /// Sum the accounting of every live bucket.
    pub fn totals(&self) -> BucketTotals {
        let mut totals = BucketTotals::default();
        self.storage.for_each(|_, entry| {
            let stats = entry.bucket.stats();
            totals.buckets += 1;
            totals.total_requests = totals.total_requests.saturating_add(stats.total_requests);
            totals.rejected_requests = totals
                .rejected_requests
                .saturating_add(stats.rejected_requests);
        });
        totals
    }

    /// Remove buckets untouched for at least `idle_timeout`.
    ///
    /// Returns the number of buckets removed.
    pub fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let now = self.clock.now();
        self.storage
            .retain(|_, entry| now.saturating_duration_since(entry.last_access) < idle_timeout)
    }

    /// Align stored buckets with a new rule set.
    ///
    /// Buckets of rules absent from `configs` are removed; the rest pick up
    /// their rule's current config. Returns the number removed.
    pub fn sync_rules(&self, configs: &HashMap<&str, &TokenBucketConfig>) -> usize {
        self.storage.retain(|_, entry| match configs.get(&*entry.rule_id) {
            Some(config) => {
                if entry.bucket.config() != *config {
                    entry.bucket.reconfigure((*config).clone());
                }
                true
            }
            None => false,
        })
    }

    /// Get the number of live buckets.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.storage.clear();
    }
}

/// Registry of circuit breakers keyed by rule id.
#[derive(Clone)]
pub struct BreakerRegistry<S>
where
    S: Storage<String, BreakerEntry> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
}

impl<S> BreakerRegistry<S>
where
    S: Storage<String, BreakerEntry> + Clone,
{
    /// Create a registry over `storage`.
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Fetch or create the breaker for `rule_id`.
    pub fn get_or_create(&self, rule_id: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let now = self.clock.now();
        self.storage.with_entry_mut(
            rule_id.to_string(),
            || {
                debug!(rule_id, "creating circuit breaker");
                BreakerEntry {
                    breaker: Arc::new(CircuitBreaker::new(config, Arc::clone(&self.clock))),
                    last_access: now,
                }
            },
            |entry| {
                entry.last_access = now;
                Arc::clone(&entry.breaker)
            },
        )
    }

    /// Fetch an existing breaker.
    pub fn get(&self, rule_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.storage
            .with_entry(&rule_id.to_string(), |entry| Arc::clone(&entry.breaker))
    }

    /// Snapshot one breaker.
    pub fn stats(&self, rule_id: &str) -> Option<BreakerStats> {
        self.storage
            .with_entry(&rule_id.to_string(), |entry| entry.breaker.stats())
    }

    /// Count breakers currently open.
    pub fn open_count(&self) -> usize {
        let mut open = 0;
        self.storage.for_each(|_, entry| {
            if entry.breaker.state() == CircuitState::Open {
                open += 1;
            }
        });
        open
    }

    /// Remove breakers untouched for at least `idle_timeout`.
    ///
    /// A breaker still referenced by an in-flight call is kept.
    pub fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let now = self.clock.now();
        self.storage.retain(|_, entry| {
            Arc::strong_count(&entry.breaker) > 1
                || now.saturating_duration_since(entry.last_access) < idle_timeout
        })
    }

    /// Align stored breakers with a new rule set.
    ///
    /// Breakers whose rule is gone, or no longer has a breaker, are removed;
    /// the rest pick up the current config. Returns the number removed.
    pub fn sync_rules(&self, configs: &HashMap<&str, CircuitBreakerConfig>) -> usize {
        self.storage
            .retain(|rule_id, entry| match configs.get(rule_id.as_str()) {
                Some(config) => {
                    if entry.breaker.config() != *config {
                        entry.breaker.reconfigure(*config);
                    }
                    true
                }
                None => false,
            })
    }

    /// Get the number of live breakers.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop every breaker.
    pub fn clear(&self) {
        self.storage.clear();
    }
}
