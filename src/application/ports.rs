//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::event::GuardEvent;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// Port for obtaining current time.
///
/// All refill and recovery arithmetic goes through this port so tests can
/// drive time explicitly. Infrastructure provides `SystemClock` and `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Values that remember when they were last used.
///
/// Storage adapters read this to pick eviction victims.
pub trait LastAccess {
    /// Instant of the most recent access.
    fn last_access(&self) -> Instant;
}

/// Candidate entry for eviction consideration.
#[derive(Debug, Clone)]
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// Last access time of the entry
    pub last_access: Instant,
}

/// Port for eviction policy decisions.
///
/// When the storage is full it collects a candidate for every live entry and
/// delegates the choice of victims to this policy.
pub trait EvictionPolicy<K>: Send + Sync + Debug
where
    K: Clone,
{
    /// Select a victim from the given candidates, or `None` to keep them all.
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K>;

    /// Select up to `count` victims in one pass.
    ///
    /// The default evicts a single entry chosen by
    /// [`select_victim`](Self::select_victim).
    fn select_victims(&self, candidates: &[EvictionCandidate<K>], count: usize) -> Vec<K> {
        self.select_victim(candidates)
            .into_iter()
            .take(count)
            .collect()
    }

    /// Whether inserting one more entry requires an eviction first.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for concurrent key-value storage.
///
/// Every closure passed to these methods runs while the entry (or its shard)
/// is locked, so read-modify-write sequences inside one closure are atomic
/// with respect to other calls on the same key.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an existing entry without creating it.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    ///
    /// Returns the number of entries removed.
    fn retain<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Port for the host's audit / error sink.
///
/// Called on every rejection and every breaker-open transition. The limiter
/// calls it synchronously but treats it as fire-and-forget: a panic inside
/// `notify` is caught and logged, and never changes the decision.
pub trait EventSink: Send + Sync + Debug {
    /// Receive one notification.
    fn notify(&self, event: &GuardEvent);
}
