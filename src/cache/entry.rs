//! Cache Entry Types

/// A resident value plus its size and recency bookkeeping.
///
/// Only `tick` changes after creation; the value itself is never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    size_bytes: u64,
    label: String,
    /// Recency stamp, larger is more recent
    tick: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, size_bytes: u64, label: impl Into<String>, tick: u64) -> Self {
        Self {
            value,
            size_bytes,
            label: label.into(),
            tick,
        }
    }

    /// Cached value
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Estimated size in bytes
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Observability label
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub(crate) fn tick(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub(crate) fn touch(&mut self, tick: u64) {
        self.tick = tick;
    }
}
