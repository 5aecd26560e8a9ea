//! Bounded LRU Cache
//!
//! Entry-count bounded store with strict recency eviction and byte accounting.
//!
//! # Design
//!
//! - `HashMap<String, CacheEntry<V>>` for lookup
//! - `BTreeMap<tick, key>` recency index; the smallest tick is the eviction victim
//! - Every `get` hit and every `set` stamps the entry with a fresh tick

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::entry::CacheEntry;
use super::metrics::CacheMetrics;

/// Snapshot returned by [`BoundedCache::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of resident entries
    pub count: usize,
    /// Sum of resident entry sizes
    pub total_bytes: u64,
    /// Labels ordered from least to most recently used
    pub labels: Vec<String>,
}

/// A key removed by eviction, with its accounting details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub key: String,
    pub label: String,
    pub size_bytes: u64,
}

/// Least-recently-used cache keyed by opaque strings
#[derive(Debug)]
pub struct BoundedCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    recency: BTreeMap<u64, String>,
    capacity: usize,
    total_bytes: u64,
    next_tick: u64,
    metrics: Arc<CacheMetrics>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            capacity: capacity.max(1),
            total_bytes: 0,
            next_tick: 0,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Get a value, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<V> {
        let tick = self.bump_tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick());
                entry.touch(tick);
                self.recency.insert(tick, key.to_string());
                self.metrics.record_hit();
                Some(entry.value().clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Insert or replace a value, then evict until within capacity.
    ///
    /// Returns the entries evicted to make room.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: V,
        size_bytes: u64,
        label: impl Into<String>,
    ) -> Vec<Evicted> {
        let key = key.into();
        let tick = self.bump_tick();

        if let Some(old) = self.entries.remove(&key) {
            self.recency.remove(&old.tick());
            self.total_bytes -= old.size_bytes();
            self.metrics.record_replacement();
        } else {
            self.metrics.record_insert();
        }

        self.total_bytes += size_bytes;
        self.recency.insert(tick, key.clone());
        self.entries
            .insert(key, CacheEntry::new(value, size_bytes, label, tick));

        self.evict_to_capacity()
    }

    /// Membership check; does not affect recency
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick());
        self.total_bytes -= entry.size_bytes();
        Some(entry.value().clone())
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.total_bytes = 0;
    }

    /// Count, total bytes, and labels oldest to newest
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.entries.len(),
            total_bytes: self.total_bytes,
            labels: self
                .recency
                .values()
                .filter_map(|k| self.entries.get(k).map(|e| e.label().to_string()))
                .collect(),
        }
    }

    /// Keys ordered from least to most recently used
    pub fn keys_oldest_to_newest(&self) -> Vec<String> {
        self.recency.values().cloned().collect()
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

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Shared handle to the hit/miss/eviction counters
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn evict_to_capacity(&mut self) -> Vec<Evicted> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes -= entry.size_bytes();
                self.metrics.record_eviction();
                debug!(
                    key = %key,
                    label = entry.label(),
                    size = entry.size_bytes(),
                    "Evicted LRU entry"
                );
                evicted.push(Evicted {
                    key,
                    label: entry.label().to_string(),
                    size_bytes: entry.size_bytes(),
                });
            }
        }
        evicted
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut cache = BoundedCache::new(3);
        cache.set("A", 1, 10, "a");
        cache.set("B", 2, 10, "b");
        cache.set("C", 3, 10, "c");

        assert_eq!(cache.get("A"), Some(1));

        let evicted = cache.set("D", 4, 10, "d");
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "B");

        assert!(cache.has("A"));
        assert!(!cache.has("B"));
        assert!(cache.has("C"));
        assert!(cache.has("D"));
        assert_eq!(cache.keys_oldest_to_newest(), vec!["C", "A", "D"]);
    }

    #[test]
    fn test_replace_adjusts_size_cleanly() {
        let mut cache = BoundedCache::new(2);
        cache.set("A", "v1", 100, "a");
        cache.set("A", "v2", 40, "a");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 40);
        assert_eq!(cache.get("A"), Some("v2"));
    }

    #[test]
    fn test_replace_refreshes_recency() {
        let mut cache = BoundedCache::new(2);
        cache.set("A", 1, 1, "a");
        cache.set("B", 2, 1, "b");
        cache.set("A", 3, 1, "a");
        cache.set("C", 4, 1, "c");

        assert!(cache.has("A"));
        assert!(!cache.has("B"));
    }

    #[test]
    fn test_has_does_not_touch_recency() {
        let mut cache = BoundedCache::new(2);
        cache.set("A", 1, 1, "a");
        cache.set("B", 2, 1, "b");
        assert!(cache.has("A"));
        cache.set("C", 3, 1, "c");

        assert!(!cache.has("A"));
    }

    #[test]
    fn test_stats_labels_oldest_to_newest() {
        let mut cache = BoundedCache::new(4);
        cache.set("year=2021", (), 5, "2021");
        cache.set("year=2022", (), 7, "2022");
        cache.set("year=2023", (), 11, "2023");
        cache.get("year=2021");

        let stats = cache.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_bytes, 23);
        assert_eq!(stats.labels, vec!["2022", "2023", "2021"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = BoundedCache::new(3);
        cache.set("A", 1, 10, "a");
        cache.set("B", 2, 20, "b");

        assert_eq!(cache.remove("A"), Some(1));
        assert_eq!(cache.remove("A"), None);
        assert_eq!(cache.total_bytes(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.stats().labels.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set("A", 1, 1, "a");
        cache.set("B", 2, 1, "b");
        assert_eq!(cache.len(), 1);
        assert!(cache.has("B"));
    }

    #[test]
    fn test_metrics_track_hits_misses_evictions() {
        let mut cache = BoundedCache::new(1);
        cache.set("A", 1, 1, "a");
        cache.get("A");
        cache.get("missing");
        cache.set("B", 2, 1, "b");

        let snap = cache.metrics().snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.evictions, 1);
        assert_eq!(snap.inserts, 2);
    }
}
