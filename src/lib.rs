//! periodcache - Bounded Cache for Yearly Multi-Series Datasets
//!
//! Fetches, caches, and serves yearly blocks of daily samples from a slow,
//! rate-limited remote source. Memory is bounded by LRU eviction; remote load
//! is bounded by a request queue with a concurrency cap, a minimum dispatch
//! interval, retries with exponential backoff, and a circuit breaker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      CacheOrchestrator                           │
//! │   request_chunk │ request_range │ preload_adjacent │ on_update  │
//! ├───────────────────────────┬─────────────────────────────────────┤
//! │        ChunkStore         │           RequestQueue               │
//! │  (BoundedCache + stitch)  │  (throttle, retry, breaker, clear)  │
//! └───────────────────────────┴──────────────────┬──────────────────┘
//!                                                ▼
//!                                     ChunkFetcher (port)
//!                               HttpChunkFetcher │ InMemoryChunkFetcher
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Fetcher and observer implementations of the domain ports
//! - [`cache`] - Generic LRU store with byte accounting
//! - [`chunk`] - Period chunks, calendar math, and range stitching
//! - [`config`] - YAML settings
//! - [`domain`] - Ports and events
//! - [`error`] - Error types
//! - [`orchestrator`] - Coalescing facade
//! - [`queue`] - Rate-limited, retrying request queue

pub mod adapters;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod queue;

// Re-export commonly used types
pub use cache::{BoundedCache, CacheStats};
pub use chunk::{Chunk, ChunkPayload, ChunkStore, Period, RangeResult, SeriesSet};
pub use config::Settings;
pub use domain::{CacheEvent, CacheObserver, ChunkFetcher};
pub use error::{Error, Result};
pub use orchestrator::{CacheOrchestrator, ChunkUpdate, OrchestratorConfig, OrchestratorStats};
pub use queue::{QueueConfig, RequestQueue};
