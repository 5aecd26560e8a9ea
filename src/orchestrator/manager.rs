//! Cache Orchestrator - request coalescing over the chunk store and queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{ChunkUpdate, OrchestratorConfig, OrchestratorStats, SubscriptionId};
use crate::cache::{CacheStats, Evicted};
use crate::chunk::{Chunk, ChunkStore, Period, RangeResult};
use crate::domain::events::CacheEvent;
use crate::domain::ports::{CacheObserver, ChunkFetcher};
use crate::error::{Error, Result};
use crate::queue::{AddOptions, RequestQueue};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Chunk>>>>;
type UpdateCallback = Arc<dyn Fn(&ChunkUpdate) + Send + Sync>;

/// One in-flight fetch, shared by every caller asking for the same period
struct PendingFetch {
    id: Uuid,
    future: SharedFetch,
}

enum Lookup {
    Cached(Arc<Chunk>),
    InFlight(SharedFetch),
}

struct Inner {
    config: OrchestratorConfig,
    store: Mutex<ChunkStore>,
    queue: RequestQueue<Arc<Chunk>>,
    fetcher: Arc<dyn ChunkFetcher>,
    pending: DashMap<Period, PendingFetch>,
    subscribers: RwLock<Vec<(SubscriptionId, UpdateCallback)>>,
    next_subscription: AtomicU64,
    observer: Arc<dyn CacheObserver>,
}

/// Cloneable handle to a bounded, coalescing period cache.
///
/// At most one remote fetch is outstanding per period. Callers arriving while
/// a fetch is in flight share its outcome.
#[derive(Clone)]
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never hold the store lock while touching the pending map
        let cached = self.inner.store.lock().stats().count;
        let pending = self.inner.pending.len();
        f.debug_struct("CacheOrchestrator")
            .field("fetcher", &self.inner.fetcher.name())
            .field("cached", &cached)
            .field("pending", &pending)
            .finish()
    }
}

impl CacheOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        config: OrchestratorConfig,
        fetcher: Arc<dyn ChunkFetcher>,
        observer: Arc<dyn CacheObserver>,
    ) -> Self {
        info!(
            max_cached_periods = config.max_cached_periods,
            max_concurrent = config.queue.max_concurrent,
            preload = config.preload_enabled,
            fetcher = fetcher.name(),
            "Creating cache orchestrator"
        );
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(ChunkStore::new(config.max_cached_periods)),
                queue: RequestQueue::new(config.queue.clone()),
                config,
                fetcher,
                pending: DashMap::new(),
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                observer,
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Get the chunk for a period, fetching it if necessary.
    ///
    /// A failure is delivered to every caller coalesced onto the same fetch.
    #[instrument(skip(self))]
    pub async fn request_chunk(&self, period: Period) -> Result<Arc<Chunk>> {
        match self.lookup_or_submit(period, AddOptions::front()) {
            Lookup::Cached(chunk) => Ok(chunk),
            Lookup::InFlight(future) => future.await,
        }
    }

    /// Serve `[start, end]` from cache, fetching only when nothing is cached.
    ///
    /// A partial result returns at once and backfills the missing periods in
    /// the background. A total miss waits for every required period and fails
    /// only if all of them fail.
    #[instrument(skip(self))]
    pub async fn request_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeResult> {
        let result = self.inner.store.lock().get_range(start, end)?;

        let required = match result {
            RangeResult::Hit(_) => return Ok(result),
            RangeResult::Partial { ref missing, .. } => {
                for span in missing {
                    self.spawn_background(span.period);
                }
                return Ok(result);
            }
            RangeResult::Miss { required } => required,
        };

        debug!(periods = ?required, "Range miss, fetching");
        let outcomes = join_all(required.iter().map(|&period| self.request_chunk(period))).await;

        let mut first_error = None;
        let mut failed = 0;
        for (period, outcome) in required.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(period = *period, error = %e, "Period unavailable for range");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
        if let Some(error) = first_error {
            if failed == required.len() {
                return Err(error);
            }
        }

        self.inner.store.lock().get_range(start, end)
    }

    /// Fetch `period - 1` and `period + 1` in the background.
    ///
    /// Neighbours already cached, already pending, or outside the configured
    /// bounds are skipped. Failures go to the observer only.
    pub fn preload_adjacent(&self, period: Period) -> Vec<JoinHandle<()>> {
        if !self.inner.config.preload_enabled {
            return Vec::new();
        }
        let earliest = self.inner.config.earliest_period;
        let latest = self
            .inner
            .config
            .latest_period
            .unwrap_or_else(|| Utc::now().year());

        [period.checked_sub(1), period.checked_add(1)]
            .into_iter()
            .flatten()
            .filter(|p| (earliest..=latest).contains(p))
            .filter(|&p| !self.has_period(p) && !self.is_pending(p))
            .map(|p| {
                debug!(period = p, "Preloading adjacent period");
                self.spawn_background(p)
            })
            .collect()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a callback run whenever a period finishes loading.
    pub fn on_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChunkUpdate) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn has_period(&self, period: Period) -> bool {
        self.inner.store.lock().has_period(period)
    }

    pub fn is_pending(&self, period: Period) -> bool {
        self.inner.pending.contains_key(&period)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.store.lock().stats()
    }

    pub fn stats(&self) -> OrchestratorStats {
        let (cache, metrics) = {
            let store = self.inner.store.lock();
            (store.stats(), store.metrics().snapshot())
        };
        let mut pending_periods: Vec<Period> =
            self.inner.pending.iter().map(|e| *e.key()).collect();
        pending_periods.sort_unstable();

        OrchestratorStats {
            cache,
            metrics,
            queue: self.inner.queue.stats(),
            pending_periods,
        }
    }

    /// Reject every waiter, forget in-flight fetches, and empty the store.
    ///
    /// Fetches already executing run to completion but their results are
    /// discarded. Returns the number of queue waiters rejected.
    pub fn clear(&self) -> usize {
        let rejected = self.inner.queue.clear();
        self.inner.pending.clear();
        self.inner.store.lock().clear();

        info!(rejected, "Cache cleared");
        self.inner.observer.record(CacheEvent::cleared(rejected));
        rejected
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lookup_or_submit(&self, period: Period, options: AddOptions) -> Lookup {
        if let Some(chunk) = self.inner.store.lock().get_chunk(period) {
            debug!(period, "Chunk cache hit");
            return Lookup::Cached(chunk);
        }

        match self.inner.pending.entry(period) {
            Entry::Occupied(entry) => {
                debug!(period, "Joining in-flight fetch");
                Lookup::InFlight(entry.get().future.clone())
            }
            Entry::Vacant(entry) => {
                // A fetch may have settled between the store check and the entry lock.
                {
                    let mut store = self.inner.store.lock();
                    if store.has_period(period) {
                        if let Some(chunk) = store.get_chunk(period) {
                            return Lookup::Cached(chunk);
                        }
                    }
                }
                let pending = Inner::submit(&self.inner, period, options);
                let future = pending.future.clone();
                entry.insert(pending);
                Lookup::InFlight(future)
            }
        }
    }

    fn spawn_background(&self, period: Period) -> JoinHandle<()> {
        let lookup = self.lookup_or_submit(period, AddOptions::default());
        let observer = Arc::clone(&self.inner.observer);
        tokio::spawn(async move {
            let outcome = match lookup {
                Lookup::Cached(_) => return,
                Lookup::InFlight(future) => future.await,
            };
            match outcome {
                Ok(_) | Err(Error::QueueCleared) => {}
                Err(e) => {
                    warn!(period, error = %e, "Background fetch failed");
                    observer.record(CacheEvent::background_fetch_failed(period, &e));
                }
            }
        })
    }
}

impl Inner {
    /// Queue a fetch and spawn the task that settles it.
    ///
    /// The settle task owns the queue future, so the store is written and the
    /// pending entry removed even when every caller has gone away.
    fn submit(inner: &Arc<Inner>, period: Period, options: AddOptions) -> PendingFetch {
        let id = Uuid::new_v4();
        let fetcher = Arc::clone(&inner.fetcher);
        let queued = inner.queue.add(
            ChunkStore::period_key(period),
            move || {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let payload = fetcher.fetch(period).await?;
                    Chunk::from_payload(period, payload).map(Arc::new)
                }
            },
            options,
        );
        // Read after enqueueing: a clear in between rejects the task anyway.
        let generation = inner.queue.generation();

        let (tx, rx) = oneshot::channel();
        let settler = Arc::clone(inner);
        tokio::spawn(async move {
            let outcome = queued.await;
            let outcome = settler.settle(period, id, generation, outcome);
            let _ = tx.send(outcome);
        });

        debug!(period, fetch_id = %id, "Fetch submitted");
        PendingFetch {
            id,
            future: async move { rx.await.unwrap_or(Err(Error::QueueCleared)) }
                .boxed()
                .shared(),
        }
    }

    fn settle(
        &self,
        period: Period,
        id: Uuid,
        generation: u64,
        outcome: Result<Arc<Chunk>>,
    ) -> Result<Arc<Chunk>> {
        let result = match outcome {
            Ok(chunk) => {
                let evicted = {
                    let mut store = self.store.lock();
                    // Checked under the store lock so a concurrent clear cannot interleave.
                    if self.queue.generation() == generation {
                        Some(store.add_chunk(Arc::clone(&chunk)))
                    } else {
                        None
                    }
                };
                match evicted {
                    Some(evicted) => {
                        self.publish_loaded(&chunk, evicted);
                        Ok(chunk)
                    }
                    None => {
                        debug!(period, "Discarding stale completion");
                        Err(Error::QueueCleared)
                    }
                }
            }
            Err(Error::QueueCleared) => Err(Error::QueueCleared),
            Err(e) => {
                warn!(period, error = %e, "Fetch failed");
                self.observer.record(CacheEvent::fetch_failed(period, &e));
                Err(e)
            }
        };

        self.pending.remove_if(&period, |_, pending| pending.id == id);
        result
    }

    fn publish_loaded(&self, chunk: &Chunk, evicted: Vec<Evicted>) {
        let update = ChunkUpdate {
            period: chunk.period(),
            label: chunk.label(),
            size_bytes: chunk.estimated_size_bytes(),
        };
        info!(
            period = update.period,
            label = %update.label,
            size_bytes = update.size_bytes,
            "Chunk loaded"
        );

        for e in evicted {
            debug!(key = %e.key, size_bytes = e.size_bytes, "Chunk evicted");
            self.observer
                .record(CacheEvent::chunk_evicted(e.key, e.label, e.size_bytes));
        }
        self.observer.record(CacheEvent::chunk_loaded(
            update.period,
            update.label.clone(),
            update.size_bytes,
        ));

        let callbacks: Vec<UpdateCallback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&update);
        }
    }
}
