//! Calendar arithmetic for yearly periods.
//!
//! Every offset is derived from real calendar dates, so 366-day years need no
//! special handling anywhere else.

use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};

/// A period key: one calendar year
pub type Period = i32;

/// Period containing `date`
#[inline]
pub fn period_of(date: NaiveDate) -> Period {
    date.year()
}

/// Number of days (and samples per series) in a period
pub fn days_in_period(period: Period) -> usize {
    if NaiveDate::from_ymd_opt(period, 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// 1 January of the period
pub fn period_start(period: Period) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(period, 1, 1).ok_or(Error::InvalidPeriod(period))
}

/// 31 December of the period
pub fn period_end(period: Period) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(period, 12, 31).ok_or(Error::InvalidPeriod(period))
}

/// Zero-based index of `date` within its period
#[inline]
pub fn day_offset(date: NaiveDate) -> usize {
    date.ordinal0() as usize
}

/// Date at a zero-based offset within a period
pub fn date_at(period: Period, offset: usize) -> Option<NaiveDate> {
    let ordinal = u32::try_from(offset).ok()?.checked_add(1)?;
    NaiveDate::from_yo_opt(period, ordinal)
}

/// Every period the inclusive range `[start, end]` touches, ascending
pub fn periods_touching(start: NaiveDate, end: NaiveDate) -> Vec<Period> {
    if start > end {
        return Vec::new();
    }
    (start.year()..=end.year()).collect()
}

/// Day count of the inclusive range `[start, end]` (0 when inverted)
pub fn days_between_inclusive(start: NaiveDate, end: NaiveDate) -> usize {
    let days = (end - start).num_days() + 1;
    usize::try_from(days).unwrap_or(0)
}
