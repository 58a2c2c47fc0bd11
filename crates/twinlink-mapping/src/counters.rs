//! Incrementor counters used by `++key` template directives.

use dashmap::DashMap;

/// Named, monotonically increasing counters.
///
/// Each key is seeded at 0. Increments of the same key are serialized by
/// the map's shard lock, so concurrent callers always observe distinct
/// values.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: DashMap<String, i64>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `key` and return the new value.
    pub fn increment(&self, key: &str) -> i64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current value of `key`, if it was ever incremented.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.counters.get(key).map(|v| *v)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_increment_sequence() {
        let store = CounterStore::new();
        assert_eq!(store.get("seq"), None);
        assert_eq!(store.increment("seq"), 1);
        assert_eq!(store.increment("seq"), 2);
        assert_eq!(store.increment("seq"), 3);
        assert_eq!(store.get("seq"), Some(3));
    }

    #[test]
    fn test_keys_are_independent() {
        let store = CounterStore::new();
        store.increment("a");
        store.increment("a");
        assert_eq!(store.increment("b"), 1);
        assert_eq!(store.get("a"), Some(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(CounterStore::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                (0..100).map(|_| store.increment("shared")).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            for value in task.await.unwrap() {
                assert!(seen.insert(value), "duplicate counter value {}", value);
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(store.get("shared"), Some(800));
    }
}
