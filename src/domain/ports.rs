//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache depends on. Adapters in [`crate::adapters`] provide
//! concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │        ChunkFetcher (remote source) │ CacheObserver          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Adapters (Impls)                         │
//! │  HttpChunkFetcher │ InMemoryChunkFetcher │ TracingObserver  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use super::events::CacheEvent;
use crate::chunk::{ChunkPayload, Period};
use crate::error::Result;

// =============================================================================
// Remote Source Port
// =============================================================================

/// Port for fetching one period from the remote dataset source.
///
/// Implementations must be idempotent and safe to retry. Failures map onto
/// `Error::Transport`, `Error::HttpStatus`, `Error::NotFound`, or
/// `Error::MalformedPayload`.
///
/// # Example
///
/// ```ignore
/// struct FileFetcher { /* ... */ }
///
/// #[async_trait]
/// impl ChunkFetcher for FileFetcher {
///     async fn fetch(&self, period: Period) -> Result<ChunkPayload> {
///         // Load year=N from somewhere
///     }
/// }
/// ```
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Fetch the raw dataset for a period.
    async fn fetch(&self, period: Period) -> Result<ChunkPayload>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "remote"
    }
}

// =============================================================================
// Observer Port
// =============================================================================

/// Port receiving cache events, including failures no caller will ever see.
pub trait CacheObserver: Send + Sync {
    /// Record one event. Must not block.
    fn record(&self, event: CacheEvent);
}

impl<O: CacheObserver + ?Sized> CacheObserver for Arc<O> {
    fn record(&self, event: CacheEvent) {
        (**self).record(event);
    }
}
