//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │            ChunkFetcher │ CacheObserver                     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ HttpChunkFetcher │ InMemoryChunkFetcher                     │ │
//! │  │ TracingObserver │ RecordingObserver │ CompositeObserver     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use periodcache::adapters::{HttpChunkFetcher, HttpFetcherConfig, TracingObserver};
//!
//! let fetcher = HttpChunkFetcher::new(HttpFetcherConfig::default())?;
//! let observer = Arc::new(TracingObserver::new());
//! let orchestrator = CacheOrchestrator::new(config, Arc::new(fetcher), observer);
//! ```

mod http;
mod in_memory;
mod observer;

pub use http::{HttpChunkFetcher, HttpFetcherConfig};
pub use in_memory::{generated_payload, InMemoryChunkFetcher};
pub use observer::{CompositeObserver, RecordingObserver, TracingObserver};
