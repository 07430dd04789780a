//! Calendar date helpers shared by the tables and the store.

use crate::error::{DataError, Result};
use chrono::{Datelike, NaiveDate};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Storage format for dates in the database and CSV files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Convert a date into days since the Unix epoch (polars `Date` physical type).
pub fn to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

/// Convert days since the Unix epoch back into a date.
pub fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_FROM_CE)
}

/// Parse a `YYYY-MM-DD` date, accepting a trailing time component.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|e| DataError::Parse(format!("Invalid date '{}': {}", raw, e)))
}
