//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table contains no rows
    #[error("Empty table: {0}")]
    Empty(String),

    /// Dates are not strictly ascending
    #[error("Dates must be strictly ascending: {previous} is followed by {next}")]
    UnsortedDates {
        /// Date of the earlier row
        previous: String,
        /// Date of the offending row
        next: String,
    },

    /// A value is missing or not finite
    #[error("Missing value for {instrument} on {date}")]
    MissingValue {
        /// Instrument column
        instrument: String,
        /// Row date
        date: String,
    },

    /// Table shape does not match its labels
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// Instrument column not present
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Duplicate instrument column
    #[error("Duplicate instrument: {0}")]
    DuplicateInstrument(String),

    /// Backup error
    #[error("Backup error: {0}")]
    Backup(String),
}
