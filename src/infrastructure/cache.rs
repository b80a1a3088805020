use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};

use crate::domain::SearchResult;

/// Cache key for one search: SHA-256 over the query text and the requested
/// `k`. Hashing the text keeps keys fixed-size; folding `k` in means a
/// repeat of the same question with a different result bound is a miss
/// instead of silently reusing a shorter cached list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey([u8; 32]);

impl QueryKey {
    pub fn new(query_text: &str, k: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(query_text.as_bytes());
        hasher.update([0u8]);
        hasher.update((k as u64).to_le_bytes());
        Self(hasher.finalize().into())
    }
}

/// Bounded query-result cache in front of the index backend.
///
/// Eviction is strictly first-in-first-out by insertion order: when an
/// insert would exceed capacity, the entry inserted earliest among those
/// still present is dropped. Lookups do not refresh an entry's position
/// (this is not an LRU). Overwriting an existing key keeps its original
/// position in the eviction queue.
///
/// Entries are never invalidated by ingestion; a query answered before an
/// ingestion that changes its top results keeps returning the stale answer
/// until the entry ages out.
pub struct QueryCache {
    capacity: usize,
    entries: HashMap<QueryKey, Vec<SearchResult>>,
    insertion_order: VecDeque<QueryKey>,
}

impl QueryCache {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<&Vec<SearchResult>> {
        self.entries.get(key)
    }

    /// Insert-or-overwrite. A zero-capacity cache stores nothing.
    pub fn insert(&mut self, key: QueryKey, results: Vec<SearchResult>) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.insert(key.clone(), results).is_none() {
            self.insertion_order.push_back(key);
            if self.insertion_order.len() > self.capacity {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkMetadata;

    fn result(text: &str) -> SearchResult {
        SearchResult {
            text: text.into(),
            metadata: ChunkMetadata::new(text, "test"),
            distance: 0.1,
        }
    }

    #[test]
    fn test_key_depends_on_text_and_k() {
        assert_eq!(QueryKey::new("refund policy", 3), QueryKey::new("refund policy", 3));
        assert_ne!(QueryKey::new("refund policy", 3), QueryKey::new("refund policy", 5));
        assert_ne!(QueryKey::new("refund policy", 3), QueryKey::new("baggage rules", 3));
    }

    #[test]
    fn test_fifo_eviction_drops_oldest() {
        let mut cache = QueryCache::new(2);
        let (a, b, c) = (
            QueryKey::new("a", 3),
            QueryKey::new("b", 3),
            QueryKey::new("c", 3),
        );

        cache.insert(a.clone(), vec![result("a")]);
        cache.insert(b.clone(), vec![result("b")]);
        cache.insert(c.clone(), vec![result("c")]);

        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_refresh_position() {
        let mut cache = QueryCache::new(2);
        let (a, b, c) = (
            QueryKey::new("a", 3),
            QueryKey::new("b", 3),
            QueryKey::new("c", 3),
        );

        cache.insert(a.clone(), vec![result("a")]);
        cache.insert(b.clone(), vec![result("b")]);

        // An LRU would keep `a` alive after this read; FIFO must not.
        assert!(cache.get(&a).is_some());
        cache.insert(c, vec![result("c")]);

        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
    }

    #[test]
    fn test_overwrite_keeps_queue_position() {
        let mut cache = QueryCache::new(2);
        let (a, b, c) = (
            QueryKey::new("a", 3),
            QueryKey::new("b", 3),
            QueryKey::new("c", 3),
        );

        cache.insert(a.clone(), vec![result("a")]);
        cache.insert(b, vec![result("b")]);
        cache.insert(a.clone(), vec![result("a2")]);
        cache.insert(c, vec![result("c")]);

        // `a` was inserted first; its overwrite must not have moved it back.
        assert!(!cache.contains(&a));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let mut cache = QueryCache::new(3);
        assert_eq!(cache.capacity(), 3);
        for i in 0..50 {
            cache.insert(QueryKey::new(&format!("q{i}"), 3), vec![result("x")]);
            assert!(cache.len() <= cache.capacity());
        }
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = QueryCache::new(0);
        let key = QueryKey::new("a", 3);
        cache.insert(key.clone(), vec![result("a")]);
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());
    }
}
