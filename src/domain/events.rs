//! Cache Events
//!
//! Immutable records of things that happened inside the cache, published to
//! the injected [`CacheObserver`](super::ports::CacheObserver).
//!
//! # Example
//!
//! ```ignore
//! observer.record(CacheEvent::chunk_loaded(2023, "2023 (4 series)", 12_480));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::Period;

/// Event emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    /// A period was fetched and stored.
    ChunkLoaded {
        period: Period,
        label: String,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A period was pushed out by the LRU policy.
    ChunkEvicted {
        key: String,
        label: String,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A fetch failed after the queue gave up.
    FetchFailed {
        period: Period,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A preload or partial-range backfill failed; no caller saw it.
    BackgroundFetchFailed {
        period: Period,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The cache and queue were reset.
    Cleared {
        rejected: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    pub fn chunk_loaded(period: Period, label: impl Into<String>, size_bytes: u64) -> Self {
        CacheEvent::ChunkLoaded {
            period,
            label: label.into(),
            size_bytes,
            timestamp: Utc::now(),
        }
    }

    pub fn chunk_evicted(
        key: impl Into<String>,
        label: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        CacheEvent::ChunkEvicted {
            key: key.into(),
            label: label.into(),
            size_bytes,
            timestamp: Utc::now(),
        }
    }

    pub fn fetch_failed(period: Period, error: impl ToString) -> Self {
        CacheEvent::FetchFailed {
            period,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn background_fetch_failed(period: Period, error: impl ToString) -> Self {
        CacheEvent::BackgroundFetchFailed {
            period,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn cleared(rejected: usize) -> Self {
        CacheEvent::Cleared {
            rejected,
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::ChunkLoaded { timestamp, .. }
            | CacheEvent::ChunkEvicted { timestamp, .. }
            | CacheEvent::FetchFailed { timestamp, .. }
            | CacheEvent::BackgroundFetchFailed { timestamp, .. }
            | CacheEvent::Cleared { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::ChunkLoaded { .. } => "ChunkLoaded",
            CacheEvent::ChunkEvicted { .. } => "ChunkEvicted",
            CacheEvent::FetchFailed { .. } => "FetchFailed",
            CacheEvent::BackgroundFetchFailed { .. } => "BackgroundFetchFailed",
            CacheEvent::Cleared { .. } => "Cleared",
        }
    }

    /// Get the period if applicable.
    pub fn period(&self) -> Option<Period> {
        match self {
            CacheEvent::ChunkLoaded { period, .. }
            | CacheEvent::FetchFailed { period, .. }
            | CacheEvent::BackgroundFetchFailed { period, .. } => Some(*period),
            _ => None,
        }
    }
}
