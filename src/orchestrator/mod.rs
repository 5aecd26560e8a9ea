//! Cache Orchestrator
//!
//! Facade tying the chunk store, the request queue, and the remote fetcher
//! together.
//!
//! ```text
//!   request_chunk(2023)
//!        │
//!        ▼
//!   ChunkStore ──hit──► Arc<Chunk>
//!        │ miss
//!        ▼
//!   pending map ──in flight──► join shared future
//!        │ vacant
//!        ▼
//!   RequestQueue ──► ChunkFetcher::fetch ──► Chunk::from_payload
//!        │
//!        ▼
//!   settle: store write, events, subscribers, pending removal
//! ```

mod manager;

use serde::Serialize;

use crate::cache::{CacheStats, MetricsSnapshot, DEFAULT_MAX_ENTRIES};
use crate::chunk::Period;
use crate::queue::{QueueConfig, QueueStats};

pub use manager::CacheOrchestrator;

/// Earliest year preloading will ever reach for by default
pub const DEFAULT_EARLIEST_PERIOD: Period = 2000;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Periods kept resident before LRU eviction
    pub max_cached_periods: usize,
    /// Allow `preload_adjacent` to schedule fetches
    pub preload_enabled: bool,
    /// Lowest period preloading may request
    pub earliest_period: Period,
    /// Highest period preloading may request; the current year when unset
    pub latest_period: Option<Period>,
    /// Request queue policies
    pub queue: QueueConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_cached_periods: DEFAULT_MAX_ENTRIES,
            preload_enabled: true,
            earliest_period: DEFAULT_EARLIEST_PERIOD,
            latest_period: None,
            queue: QueueConfig::default(),
        }
    }
}

/// Handle returned by [`CacheOrchestrator::on_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(pub(crate) u64);

/// Delivered to subscribers when a period finishes loading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkUpdate {
    pub period: Period,
    pub label: String,
    pub size_bytes: u64,
}

/// Combined snapshot of the store, its counters, and the queue
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
    pub queue: QueueStats,
    /// Periods with a fetch in flight, ascending
    pub pending_periods: Vec<Period>,
}
