//! Chunk and series value types.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calendar::{self, Period};
use crate::error::{Error, Result};

/// Nullable daily sample
pub type Sample = Option<f64>;

/// Fixed per-series bookkeeping cost added to the size estimate
const SERIES_OVERHEAD_BYTES: u64 = 64;

/// Descriptive metadata for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl SeriesMeta {
    fn estimated_bytes(&self) -> u64 {
        (self.id.len()
            + self.name.as_ref().map_or(0, String::len)
            + self.unit.as_ref().map_or(0, String::len)) as u64
    }
}

/// Raw dataset returned by the remote source for one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// One sample array per series id, starting 1 January
    pub series: BTreeMap<String, Vec<Sample>>,
    #[serde(default)]
    pub metadata: Vec<SeriesMeta>,
}

/// One validated calendar year of samples for a set of series
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    period: Period,
    start: NaiveDate,
    end: NaiveDate,
    series: BTreeMap<String, Vec<Sample>>,
    metadata: BTreeMap<String, SeriesMeta>,
}

impl Chunk {
    /// Build a chunk, rejecting any series whose length is not the period length
    pub fn from_payload(period: Period, payload: ChunkPayload) -> Result<Self> {
        let start = calendar::period_start(period)?;
        let end = calendar::period_end(period)?;
        let expected = calendar::days_in_period(period);

        for (id, samples) in &payload.series {
            if samples.len() != expected {
                return Err(Error::MalformedPayload(format!(
                    "series {id} in {period} has {} samples, expected {expected}",
                    samples.len()
                )));
            }
        }

        let metadata = payload
            .metadata
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(Self {
            period,
            start,
            end,
            series: payload.series,
            metadata,
        })
    }

    #[inline]
    pub fn period(&self) -> Period {
        self.period
    }

    /// First day of the chunk (1 January)
    #[inline]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the chunk (31 December)
    #[inline]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Samples per series
    pub fn days(&self) -> usize {
        calendar::days_in_period(self.period)
    }

    pub fn series(&self, id: &str) -> Option<&[Sample]> {
        self.series.get(id).map(Vec::as_slice)
    }

    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn metadata(&self, id: &str) -> Option<&SeriesMeta> {
        self.metadata.get(id)
    }

    /// Sample for `id` on `date`; `None` if outside the chunk, absent, or null
    pub fn sample_at(&self, id: &str, date: NaiveDate) -> Sample {
        if date < self.start || date > self.end {
            return None;
        }
        self.series(id)?
            .get(calendar::day_offset(date))
            .copied()
            .flatten()
    }

    /// Rough resident size used for cache accounting
    pub fn estimated_size_bytes(&self) -> u64 {
        let samples: u64 = self
            .series
            .iter()
            .map(|(id, s)| {
                s.len() as u64 * std::mem::size_of::<Sample>() as u64
                    + id.len() as u64
                    + SERIES_OVERHEAD_BYTES
            })
            .sum();
        let meta: u64 = self.metadata.values().map(SeriesMeta::estimated_bytes).sum();
        samples + meta
    }

    /// Human-readable label for stats and logs
    pub fn label(&self) -> String {
        format!("{} ({} series)", self.period, self.series.len())
    }
}

/// A continuous multi-series result covering exactly `[start, end]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSet {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub series: BTreeMap<String, Vec<Sample>>,
}

impl SeriesSet {
    /// Day count of the covered range
    pub fn days(&self) -> usize {
        calendar::days_between_inclusive(self.start, self.end)
    }

    pub fn get(&self, id: &str) -> Option<&[Sample]> {
        self.series.get(id).map(Vec::as_slice)
    }

    pub fn value_at(&self, id: &str, date: NaiveDate) -> Sample {
        if date < self.start || date > self.end {
            return None;
        }
        let idx = usize::try_from((date - self.start).num_days()).ok()?;
        self.get(id)?.get(idx).copied().flatten()
    }
}

/// The part of a request that falls inside an uncached period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingSpan {
    pub period: Period,
    pub start: NaiveDate,
    pub end: NaiveDate,
}
