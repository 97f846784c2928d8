//! Sharded in-memory storage for buckets and breakers.
//!
//! Backed by `DashMap`: an entry closure holds only its shard's write lock, so
//! callers on unrelated keys never contend on a global lock.

use crate::application::metrics::Metrics;
use crate::application::ports::{EvictionCandidate, EvictionPolicy, LastAccess, Storage};
use crate::application::registry::{BreakerEntry, BucketEntry};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A full store evicts `len / EVICTION_BATCH_DIVISOR` entries (at least one)
/// per scan, so the scan cost is spread over the inserts that follow.
const EVICTION_BATCH_DIVISOR: usize = 64;

/// Default storage for bucket state, keyed by bucket key.
pub type BucketStore = Arc<ShardedStorage<String, BucketEntry>>;

/// Default storage for breakers, keyed by rule id.
pub type BreakerStore = Arc<ShardedStorage<String, BreakerEntry>>;

/// Thread-safe sharded storage backed by DashMap.
///
/// With an eviction policy attached, inserting a new key first asks the policy
/// whether the map is full. If so, every entry becomes a candidate and the
/// policy picks a batch of victims, so the victims are the oldest entries of
/// the whole map regardless of which shard holds them. The cap is approximate
/// under concurrent inserts.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, V, RandomState>,
    eviction_policy: Option<Arc<dyn EvictionPolicy<K>>>,
    metrics: Option<Metrics>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an unbounded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            eviction_policy: None,
            metrics: None,
        }
    }

    /// Bound the storage with an eviction policy.
    pub fn with_eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K>>) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Count capacity evictions in `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Remove a key and return its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: LastAccess,
{
    // Must not be called while holding an entry guard: the scan takes shard
    // read locks.
    fn make_room_for(&self, key: &K) {
        let Some(policy) = &self.eviction_policy else {
            return;
        };
        let len = self.map.len();
        if !policy.should_evict(len) || self.map.contains_key(key) {
            return;
        }

        let candidates: Vec<EvictionCandidate<K>> = self
            .map
            .iter()
            .map(|entry| EvictionCandidate {
                key: entry.key().clone(),
                last_access: entry.value().last_access(),
            })
            .collect();

        let batch = (len / EVICTION_BATCH_DIVISOR).max(1);
        let mut evicted = 0;
        for victim in policy.select_victims(&candidates, batch) {
            // Another caller may have removed it since the scan
            if self.map.remove(&victim).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_evictions(evicted);
            }
        }
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("len", &self.map.len())
            .field("eviction_policy", &self.eviction_policy)
            .finish()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: LastAccess + Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        self.make_room_for(&key);
        let mut value_ref = self.map.entry(key).or_insert_with(factory);
        accessor(&mut value_ref)
    }

    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.map.get(key).map(|value_ref| accessor(&value_ref))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.map.iter() {
            f(entry.key(), entry.value());
        }
    }

    fn retain<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut removed = 0;
        self.map.retain(|key, value| {
            let keep = f(key, value);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl<K, V> Storage<K, V> for Arc<ShardedStorage<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: LastAccess + Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_entry_mut(key, factory, accessor)
    }

    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        (**self).with_entry(key, accessor)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        (**self).for_each(f)
    }

    fn retain<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        (**self).retain(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::eviction::LruEviction;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq)]
    struct Slot {
        value: u32,
        touched: Instant,
    }

    impl LastAccess for Slot {
        fn last_access(&self) -> Instant {
            self.touched
        }
    }

    fn slot(value: u32, touched: Instant) -> Slot {
        Slot { value, touched }
    }

    #[test]
    fn test_entry_created_once() {
        let storage: ShardedStorage<String, Slot> = ShardedStorage::new();
        let now = Instant::now();

        storage.with_entry_mut("a".to_string(), || slot(1, now), |s| s.value += 10);
        storage.with_entry_mut("a".to_string(), || slot(100, now), |s| s.value += 10);

        assert_eq!(storage.with_entry(&"a".to_string(), |s| s.value), Some(21));
        assert_eq!(storage.with_entry(&"b".to_string(), |s| s.value), None);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_retain_counts_removed() {
        let storage: ShardedStorage<u32, Slot> = ShardedStorage::new();
        let now = Instant::now();
        for i in 0..10 {
            storage.with_entry_mut(i, || slot(i, now), |_| ());
        }

        let removed = storage.retain(|_, s| s.value % 2 == 0);
        assert_eq!(removed, 5);
        assert_eq!(storage.len(), 5);

        assert!(storage.remove(&0).is_some());
        assert!(!storage.contains_key(&0));
    }

    #[test]
    fn test_lru_cap_evicts_oldest() {
        let metrics = Metrics::new();
        let storage: ShardedStorage<&str, Slot> = ShardedStorage::new()
            .with_eviction_policy(Arc::new(LruEviction::new(2)))
            .with_metrics(metrics.clone());
        let start = Instant::now();

        storage.with_entry_mut("old", || slot(1, start), |_| ());
        storage.with_entry_mut("new", || slot(2, start + Duration::from_secs(5)), |_| ());

        // Touching an existing key never evicts
        storage.with_entry_mut("old", || slot(0, start), |_| ());
        assert_eq!(storage.len(), 2);

        storage.with_entry_mut("newest", || slot(3, start + Duration::from_secs(9)), |_| ());
        assert_eq!(storage.len(), 2);
        assert!(!storage.contains_key(&"old"));
        assert!(storage.contains_key(&"newest"));
        assert_eq!(metrics.evicted(), 1);
    }

    fn bounded(cap: usize) -> (ShardedStorage<u32, Slot>, Metrics) {
        let metrics = Metrics::new();
        let storage = ShardedStorage::new()
            .with_eviction_policy(Arc::new(LruEviction::new(cap)))
            .with_metrics(metrics.clone());
        (storage, metrics)
    }

    // Key i was last touched `(i * 37) % 100` seconds after start, so access
    // order is unrelated to key order and to shard placement.
    fn scrambled_age(i: u32) -> u64 {
        u64::from(i * 37 % 100)
    }

    #[test]
    fn test_cap_evicts_globally_oldest_across_shards() {
        let (storage, metrics) = bounded(100);
        let start = Instant::now();
        for i in 0..100 {
            let touched = start + Duration::from_secs(scrambled_age(i));
            storage.with_entry_mut(i, || slot(i, touched), |_| ());
        }

        for j in 0..10 {
            let touched = start + Duration::from_secs(1_000 + u64::from(j));
            storage.with_entry_mut(1_000 + j, || slot(j, touched), |_| ());
        }

        assert_eq!(storage.len(), 100);
        assert_eq!(metrics.evicted(), 10);
        for i in 0..100 {
            assert_eq!(
                storage.contains_key(&i),
                scrambled_age(i) >= 10,
                "key {i} touched at +{}s",
                scrambled_age(i)
            );
        }
        for j in 0..10 {
            assert!(storage.contains_key(&(1_000 + j)));
        }
    }

    #[test]
    fn test_full_store_evicts_a_batch() {
        let (storage, metrics) = bounded(1_000);
        let start = Instant::now();
        for i in 0..1_000 {
            let touched = start + Duration::from_millis(u64::from(i * 7919 % 1_000));
            storage.with_entry_mut(i, || slot(i, touched), |_| ());
        }

        storage.with_entry_mut(5_000, || slot(0, start + Duration::from_secs(60)), |_| ());

        // 1000 / 64 = 15 oldest go at once, then the new key is inserted
        assert_eq!(metrics.evicted(), 15);
        assert_eq!(storage.len(), 986);
        let mut oldest_left = Duration::MAX;
        storage.for_each(|_, s| oldest_left = oldest_left.min(s.touched - start));
        assert_eq!(oldest_left, Duration::from_millis(15));
    }

    #[test]
    fn test_concurrent_access() {
        let storage: Arc<ShardedStorage<u32, Slot>> = Arc::new(ShardedStorage::new());
        let now = Instant::now();
        let mut handles = vec![];

        for _ in 0..8 {
            let storage = Arc::clone(&storage);
            handles.push(thread::spawn(move || {
                for key in 0..50 {
                    storage.with_entry_mut(key, || slot(0, now), |s| s.value += 1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.len(), 50);
        storage.for_each(|_, s| assert_eq!(s.value, 8));
    }
}
