//! Chunk Store
//!
//! Holds one chunk per period in a [`BoundedCache`] and answers date-range
//! queries by slicing, stitching, or reporting what is missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::trace;

use super::calendar::{self, Period};
use super::model::{Chunk, MissingSpan, Sample, SeriesSet};
use crate::cache::{BoundedCache, CacheMetrics, CacheStats, Evicted};
use crate::error::{Error, Result};

/// Outcome of a range lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RangeResult {
    /// Every touched period is cached
    Hit(SeriesSet),
    /// Some periods are cached; missing spans are null-filled in `data`
    Partial {
        data: SeriesSet,
        missing: Vec<MissingSpan>,
        available: Vec<Period>,
    },
    /// Nothing the range touches is cached
    Miss { required: Vec<Period> },
}

impl RangeResult {
    /// Stitched data, if any period was available
    pub fn data(&self) -> Option<&SeriesSet> {
        match self {
            RangeResult::Hit(data) | RangeResult::Partial { data, .. } => Some(data),
            RangeResult::Miss { .. } => None,
        }
    }

    /// Periods that still need fetching
    pub fn missing_periods(&self) -> Vec<Period> {
        match self {
            RangeResult::Hit(_) => Vec::new(),
            RangeResult::Partial { missing, .. } => missing.iter().map(|m| m.period).collect(),
            RangeResult::Miss { required } => required.clone(),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, RangeResult::Hit(_))
    }
}

/// Period-keyed chunk cache
#[derive(Debug)]
pub struct ChunkStore {
    cache: BoundedCache<Arc<Chunk>>,
}

impl ChunkStore {
    /// Create a store holding at most `max_periods` chunks
    pub fn new(max_periods: usize) -> Self {
        Self {
            cache: BoundedCache::new(max_periods),
        }
    }

    /// Opaque cache key for a period
    pub fn period_key(period: Period) -> String {
        format!("year={period}")
    }

    /// Store a chunk under its own period, evicting as needed
    pub fn add_chunk(&mut self, chunk: Arc<Chunk>) -> Vec<Evicted> {
        let size = chunk.estimated_size_bytes();
        let label = chunk.label();
        self.cache
            .set(Self::period_key(chunk.period()), chunk, size, label)
    }

    /// Cached chunk for a period; marks it recently used
    pub fn get_chunk(&mut self, period: Period) -> Option<Arc<Chunk>> {
        self.cache.get(&Self::period_key(period))
    }

    pub fn has_period(&self, period: Period) -> bool {
        self.cache.has(&Self::period_key(period))
    }

    /// Resident periods, least recently used first
    pub fn cached_periods(&self) -> Vec<Period> {
        self.cache
            .keys_oldest_to_newest()
            .iter()
            .filter_map(|k| k.strip_prefix("year=").and_then(|p| p.parse().ok()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        self.cache.metrics()
    }

    /// Answer `[start, end]` from cached chunks
    pub fn get_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<RangeResult> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }

        let required = calendar::periods_touching(start, end);
        let mut chunks = Vec::with_capacity(required.len());
        let mut missing = Vec::new();

        for &period in &required {
            match self.get_chunk(period) {
                Some(chunk) => chunks.push(chunk),
                None => missing.push(missing_span(period, start, end)?),
            }
        }

        if chunks.is_empty() {
            trace!(?required, "Range miss");
            return Ok(RangeResult::Miss { required });
        }

        if missing.is_empty() {
            let data = match chunks.as_slice() {
                [single] => slice_chunk(single, start, end),
                _ => stitch(&chunks, start, end),
            };
            return Ok(RangeResult::Hit(data));
        }

        let available = chunks.iter().map(|c| c.period()).collect();
        Ok(RangeResult::Partial {
            data: stitch(&chunks, start, end),
            missing,
            available,
        })
    }
}

/// Intersection of a period with the requested range
fn missing_span(period: Period, start: NaiveDate, end: NaiveDate) -> Result<MissingSpan> {
    Ok(MissingSpan {
        period,
        start: start.max(calendar::period_start(period)?),
        end: end.min(calendar::period_end(period)?),
    })
}

/// Single-chunk fast path: slice at day offsets
fn slice_chunk(chunk: &Chunk, start: NaiveDate, end: NaiveDate) -> SeriesSet {
    let from = calendar::day_offset(start);
    let to = calendar::day_offset(end);
    let series = chunk
        .series_ids()
        .filter_map(|id| {
            chunk
                .series(id)
                .map(|samples| (id.to_string(), samples[from..=to].to_vec()))
        })
        .collect();

    SeriesSet { start, end, series }
}

/// Copy each chunk's overlap into a freshly allocated, null-filled output.
///
/// `chunks` must be in ascending period order and all lie within the range's
/// periods. Series ids are the union across chunks.
fn stitch(chunks: &[Arc<Chunk>], start: NaiveDate, end: NaiveDate) -> SeriesSet {
    let total = calendar::days_between_inclusive(start, end);

    let mut series: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for chunk in chunks {
        for id in chunk.series_ids() {
            series
                .entry(id.to_string())
                .or_insert_with(|| vec![None; total]);
        }
    }

    for chunk in chunks {
        let overlap_start = start.max(chunk.start());
        let overlap_end = end.min(chunk.end());
        if overlap_start > overlap_end {
            continue;
        }
        let src_from = calendar::day_offset(overlap_start);
        let src_to = calendar::day_offset(overlap_end);
        let dst = (overlap_start - start).num_days() as usize;
        let len = src_to - src_from + 1;

        for (id, out) in series.iter_mut() {
            if let Some(samples) = chunk.series(id) {
                out[dst..dst + len].copy_from_slice(&samples[src_from..=src_to]);
            }
        }
    }

    SeriesSet { start, end, series }
}

// =============================================================================
// Tests
// =============================================================================
