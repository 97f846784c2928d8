//! Eviction adapters for capacity-bounded storage.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// LRU (least recently used) eviction with an entry limit.
///
/// Once the limit is reached, evicts the least recently accessed entries
/// across the whole store. Victims are chosen by a linear selection, not a
/// full sort.
#[derive(Debug, Clone)]
pub struct LruEviction {
    max_entries: usize,
}

impl LruEviction {
    /// Create a policy that keeps at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// The configured entry limit.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K> EvictionPolicy<K> for LruEviction
where
    K: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        candidates
            .iter()
            .min_by_key(|candidate| candidate.last_access)
            .map(|candidate| candidate.key.clone())
    }

    fn select_victims(&self, candidates: &[EvictionCandidate<K>], count: usize) -> Vec<K> {
        let count = count.min(candidates.len());
        if count == 0 {
            return Vec::new();
        }

        let mut by_age: Vec<&EvictionCandidate<K>> = candidates.iter().collect();
        by_age.select_nth_unstable_by_key(count - 1, |candidate| candidate.last_access);
        by_age[..count]
            .iter()
            .map(|candidate| candidate.key.clone())
            .collect()
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn candidate(key: &str, age_secs: u64, now: Instant) -> EvictionCandidate<String> {
        EvictionCandidate {
            key: key.to_string(),
            last_access: now - Duration::from_secs(age_secs),
        }
    }

    #[test]
    fn test_lru_select_oldest() {
        let policy = LruEviction::new(10);
        let now = Instant::now() + Duration::from_secs(3600);

        let candidates = vec![
            candidate("fresh", 0, now),
            candidate("stale", 600, now),
            candidate("middle", 60, now),
        ];

        assert_eq!(policy.select_victim(&candidates), Some("stale".to_string()));
    }

    #[test]
    fn test_lru_should_evict() {
        let policy = LruEviction::new(100);

        assert!(!EvictionPolicy::<String>::should_evict(&policy, 99));
        assert!(EvictionPolicy::<String>::should_evict(&policy, 100));
        assert!(EvictionPolicy::<String>::should_evict(&policy, 101));
    }

    #[test]
    fn test_lru_empty_candidates() {
        let policy = LruEviction::new(10);
        let candidates: Vec<EvictionCandidate<String>> = vec![];
        assert_eq!(policy.select_victim(&candidates), None);
    }

    #[test]
    fn test_lru_selects_oldest_batch() {
        let policy = LruEviction::new(10);
        let now = Instant::now() + Duration::from_secs(3600);
        let candidates: Vec<_> = [("a", 5), ("b", 50), ("c", 1), ("d", 40), ("e", 30)]
            .into_iter()
            .map(|(key, age)| candidate(key, age, now))
            .collect();

        let mut victims = policy.select_victims(&candidates, 3);
        victims.sort();
        assert_eq!(victims, vec!["b", "d", "e"]);

        assert_eq!(policy.select_victims(&candidates, 0), Vec::<String>::new());
        assert_eq!(policy.select_victims(&candidates, 99).len(), 5);
    }
}
