//! Daily market-factor table.
//!
//! A [`MarketSeries`] holds one row per date and one column per instrument
//! code (equity index, commodity index, swap rate, FX rate). Rows are strictly
//! ascending by date and every cell is a finite level.
//!
//! Market data is only published on trading days while coverage ratios are
//! dated on calendar month ends, so the series can be reindexed onto a dense
//! daily calendar where weekends and holidays carry the prior trading day's
//! value.

use crate::dates::{from_epoch_days, to_epoch_days};
use crate::error::{DataError, Result};
use chrono::{Days, NaiveDate};
use ndarray::{Array2, ArrayView1, Axis, s};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single market observation in long format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    /// Observation date
    pub date: NaiveDate,
    /// Instrument short code (e.g. "IWDA.AS", "EUSA30")
    pub instrument: String,
    /// Level or rate
    pub value: f64,
}

impl MarketObservation {
    /// Create a new market observation.
    pub fn new(date: NaiveDate, instrument: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            instrument: instrument.into(),
            value,
        }
    }
}

/// Date-indexed table of market-factor levels.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSeries {
    dates: Vec<NaiveDate>,
    instruments: Vec<String>,
    /// Rows are dates, columns are instruments
    values: Array2<f64>,
}

impl MarketSeries {
    /// Create a market series from its parts.
    ///
    /// # Errors
    /// Fails when the shape does not match the labels, dates are not strictly
    /// ascending, instruments repeat, or a value is not finite.
    pub fn new(dates: Vec<NaiveDate>, instruments: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != dates.len() {
            return Err(DataError::DimensionMismatch {
                expected: dates.len(),
                actual: values.nrows(),
            });
        }
        if values.ncols() != instruments.len() {
            return Err(DataError::DimensionMismatch {
                expected: instruments.len(),
                actual: values.ncols(),
            });
        }

        let mut seen = BTreeSet::new();
        for instrument in &instruments {
            if !seen.insert(instrument.as_str()) {
                return Err(DataError::DuplicateInstrument(instrument.clone()));
            }
        }

        for pair in dates.windows(2) {
            if pair[0] >= pair[1] {
                return Err(DataError::UnsortedDates {
                    previous: pair[0].to_string(),
                    next: pair[1].to_string(),
                });
            }
        }

        for ((row, col), value) in values.indexed_iter() {
            if !value.is_finite() {
                return Err(DataError::MissingValue {
                    instrument: instruments[col].clone(),
                    date: dates[row].to_string(),
                });
            }
        }

        Ok(Self {
            dates,
            instruments,
            values,
        })
    }

    /// Build a wide table from long-format observations.
    ///
    /// Instruments become columns in lexicographic order. Repeated
    /// (date, instrument) observations are averaged. Gaps are forward-filled
    /// per instrument, and leading rows that still miss an instrument (before
    /// its first observation) are dropped.
    pub fn from_observations(observations: &[MarketObservation]) -> Result<Self> {
        if observations.is_empty() {
            return Err(DataError::Empty("market observations".to_string()));
        }

        let instruments: Vec<String> = observations
            .iter()
            .map(|o| o.instrument.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_of: BTreeMap<&str, usize> = instruments
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        // (sum, count) per cell
        let mut cells: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
        for obs in observations {
            if !obs.value.is_finite() {
                continue;
            }
            let row = cells
                .entry(obs.date)
                .or_insert_with(|| vec![(0.0, 0); instruments.len()]);
            let cell = &mut row[column_of[obs.instrument.as_str()]];
            cell.0 += obs.value;
            cell.1 += 1;
        }

        let dates: Vec<NaiveDate> = cells.keys().copied().collect();
        let mut values = Array2::<f64>::from_elem((dates.len(), instruments.len()), f64::NAN);
        for (row, row_cells) in cells.values().enumerate() {
            for (col, &(sum, count)) in row_cells.iter().enumerate() {
                if count > 0 {
                    values[[row, col]] = sum / count as f64;
                }
            }
        }

        // Forward fill each instrument
        for mut column in values.columns_mut() {
            let mut last = f64::NAN;
            for value in column.iter_mut() {
                if value.is_nan() {
                    *value = last;
                } else {
                    last = *value;
                }
            }
        }

        let first_complete = values
            .rows()
            .into_iter()
            .position(|row| row.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                DataError::Empty("no date on which every instrument has a value".to_string())
            })?;

        let values = values.slice(s![first_complete.., ..]).to_owned();
        let dates = dates[first_complete..].to_vec();

        Self::new(dates, instruments, values)
    }

    /// Build a market series from a polars frame with a `date` column and one
    /// numeric column per instrument.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let days = df
            .column("date")?
            .cast(&DataType::Date)?
            .cast(&DataType::Int32)?;
        let days = days.i32()?;

        let mut dates = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let day = days
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing date".to_string()))?;
            let date = from_epoch_days(day)
                .ok_or_else(|| DataError::Parse(format!("Date out of range: {}", day)))?;
            dates.push(date);
        }

        let instruments: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != "date")
            .map(|name| name.to_string())
            .collect();

        let mut values = Array2::<f64>::zeros((df.height(), instruments.len()));
        for (j, instrument) in instruments.iter().enumerate() {
            let column = df.column(instrument)?.cast(&DataType::Float64)?;
            let column = column.f64()?;
            for i in 0..df.height() {
                values[[i, j]] = column.get(i).unwrap_or(f64::NAN);
            }
        }

        Self::new(dates, instruments, values)
    }

    /// Convert into a polars frame with a `date` column followed by one
    /// `Float64` column per instrument.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let days: Vec<i32> = self.dates.iter().map(|d| to_epoch_days(*d)).collect();
        let mut columns = Vec::with_capacity(self.instruments.len() + 1);
        columns.push(Column::new("date".into(), days).cast(&DataType::Date)?);
        for (j, instrument) in self.instruments.iter().enumerate() {
            columns.push(Column::new(
                instrument.as_str().into(),
                self.values.column(j).to_vec(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Row dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Instrument codes in column order.
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Value matrix (dates x instruments).
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the series has no dates.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Earliest date.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Latest available market date.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Values of all instruments on row `index`.
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// Column index of an instrument.
    pub fn instrument_index(&self, instrument: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i == instrument)
    }

    /// All values of one instrument.
    pub fn column(&self, instrument: &str) -> Option<ArrayView1<'_, f64>> {
        self.instrument_index(instrument)
            .map(|j| self.values.column(j))
    }

    /// Value of an instrument on an exact date.
    pub fn value_on(&self, date: NaiveDate, instrument: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.instrument_index(instrument)?;
        Some(self.values[[row, col]])
    }

    /// Reindex onto every calendar day between the first and latest date,
    /// carrying the prior trading day's values over gaps.
    pub fn reindex_daily(&self) -> Result<Self> {
        let (Some(first), Some(last)) = (self.first_date(), self.latest_date()) else {
            return Err(DataError::Empty("market series".to_string()));
        };

        let span = (last - first).num_days() as usize + 1;
        let mut dates = Vec::with_capacity(span);
        let mut values = Array2::<f64>::zeros((span, self.instruments.len()));

        let mut source = 0;
        let mut day = first;
        for target in 0..span {
            while source + 1 < self.dates.len() && self.dates[source + 1] <= day {
                source += 1;
            }
            values.row_mut(target).assign(&self.values.row(source));
            dates.push(day);
            day = day
                .checked_add_days(Days::new(1))
                .ok_or_else(|| DataError::Parse(format!("Date overflow after {}", day)))?;
        }

        Ok(Self {
            dates,
            instruments: self.instruments.clone(),
            values,
        })
    }

    /// Rows dated strictly after `date`.
    pub fn after(&self, date: NaiveDate) -> Self {
        let start = self.dates.partition_point(|d| *d <= date);
        Self {
            dates: self.dates[start..].to_vec(),
            instruments: self.instruments.clone(),
            values: self.values.slice(s![start.., ..]).to_owned(),
        }
    }

    /// Reorder and restrict columns to `instruments`.
    pub fn select(&self, instruments: &[String]) -> Result<Self> {
        let indices = instruments
            .iter()
            .map(|name| {
                self.instrument_index(name)
                    .ok_or_else(|| DataError::UnknownInstrument(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dates: self.dates.clone(),
            instruments: instruments.to_vec(),
            values: self.values.select(Axis(1), &indices),
        })
    }
}
