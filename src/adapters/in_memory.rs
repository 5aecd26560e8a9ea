//! In-Memory Chunk Fetcher
//!
//! Serves payloads from a map. Supports artificial latency and scripted
//! per-period failures so queue and orchestrator behavior can be exercised
//! without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::chunk::{calendar, ChunkPayload, Period, SeriesMeta};
use crate::domain::ports::ChunkFetcher;
use crate::error::{Error, Result};

/// Map-backed fetcher.
///
/// Periods without a payload answer `NotFound`. Scripted failures are consumed
/// one per call before the payload is served.
#[derive(Debug, Default)]
pub struct InMemoryChunkFetcher {
    payloads: RwLock<HashMap<Period, ChunkPayload>>,
    failures: Mutex<HashMap<Period, VecDeque<Error>>>,
    calls: Mutex<HashMap<Period, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryChunkFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Serve `payload` for `period`.
    pub fn with_payload(self, period: Period, payload: ChunkPayload) -> Self {
        self.insert(period, payload);
        self
    }

    /// Serve a generated payload for `period` covering `series_ids`.
    pub fn with_generated(self, period: Period, series_ids: &[&str]) -> Self {
        self.insert(period, generated_payload(period, series_ids));
        self
    }

    pub fn insert(&self, period: Period, payload: ChunkPayload) {
        self.payloads.write().insert(period, payload);
    }

    /// Fail the next call for `period` with `error`. Calls stack in order.
    pub fn fail_next(&self, period: Period, error: Error) {
        self.failures
            .lock()
            .entry(period)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `times` calls for `period` with `error`.
    pub fn fail_times(&self, period: Period, error: Error, times: usize) {
        for _ in 0..times {
            self.fail_next(period, error.clone());
        }
    }

    /// Calls made for `period`, including failed ones.
    pub fn calls_for(&self, period: Period) -> usize {
        self.calls.lock().get(&period).copied().unwrap_or(0)
    }

    /// Calls made across every period.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkFetcher for InMemoryChunkFetcher {
    async fn fetch(&self, period: Period) -> Result<ChunkPayload> {
        *self.calls.lock().entry(period).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .failures
            .lock()
            .get_mut(&period)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        self.payloads
            .read()
            .get(&period)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                key: format!("year={}", period),
            })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Deterministic payload whose samples encode `period * 1000 + day_offset`.
///
/// Every seventh day is left null so gaps survive stitching.
pub fn generated_payload(period: Period, series_ids: &[&str]) -> ChunkPayload {
    let days = calendar::days_in_period(period);
    ChunkPayload {
        series: series_ids
            .iter()
            .map(|id| {
                let samples = (0..days)
                    .map(|offset| {
                        if offset % 7 == 6 {
                            None
                        } else {
                            Some((period as i64 * 1000 + offset as i64) as f64)
                        }
                    })
                    .collect();
                (id.to_string(), samples)
            })
            .collect(),
        metadata: series_ids
            .iter()
            .map(|id| SeriesMeta {
                id: id.to_string(),
                name: Some(id.to_string()),
                unit: None,
            })
            .collect(),
    }
}
