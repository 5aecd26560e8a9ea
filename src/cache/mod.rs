//! Bounded In-Memory Cache
//!
//! Generic least-recently-used store keyed by opaque string keys, with
//! per-entry byte accounting.
//!
//! # Invariants
//!
//! - `total_bytes` always equals the sum of resident entry sizes
//! - Eviction order is strict recency: the entry least recently read or
//!   written is removed first
//! - Replacing a key subtracts the old size before adding the new one

mod entry;
mod lru;
mod metrics;
mod proptest;

pub use entry::CacheEntry;
pub use lru::{BoundedCache, CacheStats, Evicted};
pub use metrics::{CacheMetrics, MetricsSnapshot};

/// Default number of resident periods
pub const DEFAULT_MAX_ENTRIES: usize = 12;
