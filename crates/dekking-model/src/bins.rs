//! Calendar bins for aggregating contributions.

use crate::error::ModelError;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of aggregated contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBin {
    /// One bin per date (no aggregation)
    #[default]
    Daily,
    /// Weeks ending on Sunday
    Weekly,
    /// Calendar months
    Monthly,
}

impl TimeBin {
    /// Label of the bin containing `date`.
    ///
    /// Weekly bins are labelled with the Sunday closing the week and monthly
    /// bins with the last day of the month.
    pub fn label(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                let to_sunday = 6 - u64::from(date.weekday().num_days_from_monday());
                date.checked_add_days(Days::new(to_sunday)).unwrap_or(date)
            }
            Self::Monthly => date
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|next| next.pred_opt())
                .unwrap_or(date),
        }
    }
}

impl fmt::Display for TimeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeBin {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Self::Daily),
            "weekly" | "w" => Ok(Self::Weekly),
            "monthly" | "m" => Ok(Self::Monthly),
            other => Err(ModelError::InvalidParameter(format!(
                "unknown time bin '{}' (expected daily, weekly or monthly)",
                other
            ))),
        }
    }
}
