//! Cache Observer Adapters
//!
//! Implements the `CacheObserver` port with various backends.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::events::CacheEvent;
use crate::domain::ports::CacheObserver;

/// Tracing-based observer.
///
/// Failures are logged at warn, loads and evictions at info or debug.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    /// Whether to log routine events at info level (true) or debug level (false)
    info_level: bool,
}

impl TracingObserver {
    /// Create a new tracing observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an observer that logs routine events at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }
}

impl CacheObserver for TracingObserver {
    fn record(&self, event: CacheEvent) {
        let event_type = event.event_type();
        match &event {
            CacheEvent::FetchFailed { period, error, .. }
            | CacheEvent::BackgroundFetchFailed { period, error, .. } => {
                warn!(event_type = %event_type, period = *period, error = %error, "Cache event");
            }
            _ => {
                let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
                if self.info_level {
                    info!(event_type = %event_type, event = %json, "Cache event");
                } else {
                    debug!(event_type = %event_type, event = %json, "Cache event");
                }
            }
        }
    }
}

/// In-memory observer for testing.
///
/// Collects events for later inspection.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RwLock<Vec<CacheEvent>>,
}

impl RecordingObserver {
    /// Create a new recording observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl CacheObserver for RecordingObserver {
    fn record(&self, event: CacheEvent) {
        self.events.write().push(event);
    }
}

/// Fans each event out to several observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn CacheObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the composite.
    pub fn with_observer<O: CacheObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

impl CacheObserver for CompositeObserver {
    fn record(&self, event: CacheEvent) {
        for observer in &self.observers {
            observer.record(event.clone());
        }
    }
}
