//! Domain Layer
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for the remote source and observers
//! - **Events** (`events.rs`) - Records published when chunks load, evict, or fail
//!
//! # Usage
//!
//! ```ignore
//! use periodcache::domain::{CacheObserver, ChunkFetcher};
//!
//! async fn warm<F: ChunkFetcher>(fetcher: &F, period: Period) -> Result<ChunkPayload> {
//!     fetcher.fetch(period).await
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::CacheEvent;
pub use ports::{CacheObserver, ChunkFetcher};
