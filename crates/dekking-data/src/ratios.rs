//! Official coverage-ratio publications.
//!
//! Funds publish their coverage ratio (dekkingsgraad) at most once a month,
//! several weeks after the reference date. Ratios are expressed in percent.

use crate::dates::{from_epoch_days, to_epoch_days};
use crate::error::{DataError, Result};
use crate::fund::FundId;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single official coverage-ratio publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRatioObservation {
    /// Reference date of the publication
    pub date: NaiveDate,
    /// Fund that published the ratio
    pub fund: FundId,
    /// Coverage ratio in percent
    pub ratio: f64,
}

impl CoverageRatioObservation {
    /// Create a new observation.
    pub fn new(date: NaiveDate, fund: impl Into<FundId>, ratio: f64) -> Self {
        Self {
            date,
            fund: fund.into(),
            ratio,
        }
    }
}

/// Long-format table of coverage-ratio observations for all funds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageRatios {
    series: BTreeMap<FundId, BTreeMap<NaiveDate, f64>>,
}

impl CoverageRatios {
    /// Build the table from observations.
    ///
    /// Non-finite ratios are skipped; a repeated (fund, date) keeps the last
    /// observation.
    pub fn from_observations(observations: impl IntoIterator<Item = CoverageRatioObservation>) -> Self {
        let mut ratios = Self::default();
        for obs in observations {
            ratios.insert(obs);
        }
        ratios
    }

    /// Add one observation.
    pub fn insert(&mut self, observation: CoverageRatioObservation) {
        if !observation.ratio.is_finite() {
            return;
        }
        self.series
            .entry(observation.fund)
            .or_default()
            .insert(observation.date, observation.ratio);
    }

    /// Build the table from a polars frame with `date`, `fund` and `ratio`
    /// columns.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let days = df
            .column("date")?
            .cast(&DataType::Date)?
            .cast(&DataType::Int32)?;
        let days = days.i32()?;
        let funds = df.column("fund")?.str()?;
        let values = df.column("ratio")?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let mut ratios = Self::default();
        for i in 0..df.height() {
            let day = days
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing date".to_string()))?;
            let date = from_epoch_days(day)
                .ok_or_else(|| DataError::Parse(format!("Date out of range: {}", day)))?;
            let fund = funds
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing fund".to_string()))?;
            let Some(ratio) = values.get(i) else {
                continue;
            };
            ratios.insert(CoverageRatioObservation::new(date, fund, ratio));
        }

        Ok(ratios)
    }

    /// Convert into a polars frame with `date`, `fund` and `ratio` columns,
    /// sorted by fund then date.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut days = Vec::new();
        let mut funds = Vec::new();
        let mut values = Vec::new();
        for obs in self.observations() {
            days.push(to_epoch_days(obs.date));
            funds.push(obs.fund.to_string());
            values.push(obs.ratio);
        }

        Ok(DataFrame::new(vec![
            Column::new("date".into(), days).cast(&DataType::Date)?,
            Column::new("fund".into(), funds),
            Column::new("ratio".into(), values),
        ])?)
    }

    /// Funds present in the table, ordered by identifier.
    pub fn funds(&self) -> Vec<FundId> {
        self.series.keys().cloned().collect()
    }

    /// Whether the table has no funds.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of observations.
    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    /// Date-ascending ratio series for one fund.
    pub fn series(&self, fund: &FundId) -> Vec<(NaiveDate, f64)> {
        self.series
            .get(fund)
            .map(|s| s.iter().map(|(d, r)| (*d, *r)).collect())
            .unwrap_or_default()
    }

    /// Date of the fund's most recent official publication.
    pub fn last_official_date(&self, fund: &FundId) -> Option<NaiveDate> {
        self.series
            .get(fund)
            .and_then(|s| s.keys().next_back().copied())
    }

    /// The fund's most recent official (date, ratio).
    pub fn last_official(&self, fund: &FundId) -> Option<(NaiveDate, f64)> {
        self.series
            .get(fund)
            .and_then(|s| s.iter().next_back().map(|(d, r)| (*d, *r)))
    }

    /// All observations, by fund then date.
    pub fn observations(&self) -> impl Iterator<Item = CoverageRatioObservation> + '_ {
        self.series.iter().flat_map(|(fund, series)| {
            series
                .iter()
                .map(move |(date, ratio)| CoverageRatioObservation::new(*date, fund.clone(), *ratio))
        })
    }
}
