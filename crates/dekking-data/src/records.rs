//! Run outputs: forecast points and factor contributions.
//!
//! Both records are tagged with the timestamp of the run that produced them
//! so that successive runs can be appended to the same table and told apart.

use crate::fund::FundId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Predicted coverage ratio for one fund on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Market date the prediction is for
    pub date: NaiveDate,
    /// Fund
    pub fund: FundId,
    /// Predicted coverage ratio in percent
    pub predicted_ratio: f64,
    /// Run that produced the prediction
    pub run_timestamp: DateTime<Utc>,
}

impl ForecastPoint {
    /// Create a new forecast point.
    pub const fn new(
        date: NaiveDate,
        fund: FundId,
        predicted_ratio: f64,
        run_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            fund,
            predicted_ratio,
            run_timestamp,
        }
    }
}

/// Change in the predicted coverage ratio attributed to one market factor.
///
/// The value is expressed in percentage points versus the previous forecast
/// date (or versus the start of the bin after aggregation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    /// Market date (or bin label)
    pub date: NaiveDate,
    /// Fund
    pub fund: FundId,
    /// Market factor (instrument code)
    pub factor: String,
    /// Contribution in percentage points
    pub contribution: f64,
    /// Run that produced the contribution
    pub run_timestamp: DateTime<Utc>,
}

impl ContributionRecord {
    /// Create a new contribution record.
    pub const fn new(
        date: NaiveDate,
        fund: FundId,
        factor: String,
        contribution: f64,
        run_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            fund,
            factor,
            contribution,
            run_timestamp,
        }
    }
}
