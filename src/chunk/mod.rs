//! Period Chunks and Range Stitching
//!
//! A chunk is one calendar year of daily samples for a set of named series.
//! The [`ChunkStore`] keeps a bounded number of chunks and serves arbitrary
//! date ranges from them.
//!
//! # Range Lookup
//!
//! ```text
//!   request [2022-11-01 .. 2024-02-28]
//!          │
//!          ▼
//!   periods touched: 2022, 2023, 2024
//!          │
//!   ┌──────┴───────┬──────────────┐
//!   │ 2022 cached  │ 2023 cached  │ 2024 missing
//!   └──────┬───────┴──────┬───────┘
//!          ▼              ▼
//!   Partial { data (2024 span null), missing: [2024], available: [2022, 2023] }
//! ```

pub mod calendar;
mod model;
mod store;

pub use calendar::Period;
pub use model::{Chunk, ChunkPayload, MissingSpan, Sample, SeriesMeta, SeriesSet};
pub use store::{ChunkStore, RangeResult};
