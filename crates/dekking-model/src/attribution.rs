//! Additive decomposition of forecast changes into factor contributions.
//!
//! For a fund's forecast horizon, the first row is taken as the baseline.
//! For each factor a counterfactual table is built in which every other
//! factor is held at its baseline value; the model's prediction on that
//! table is differenced day over day, with the first day defined as zero.
//!
//! # Linearity assumption
//!
//! The per-factor deltas sum to the day-over-day change of the real forecast
//! only because [`FundModel`] is linear: the prediction is a sum of
//! independent `coefficient · level` terms, so each counterfactual moves
//! exactly one term. A non-linear model would break this additivity.
//! [`verify_additivity`] checks the property on produced tables.

use crate::bins::TimeBin;
use crate::error::{ModelError, Result};
use crate::forecast::forecast_horizon;
use crate::model::FundModel;
use chrono::{DateTime, NaiveDate, Utc};
use dekking_data::{ContributionRecord, CoverageRatios, ForecastPoint, FundId, MarketSeries};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Contribution rows of one run, plus the funds that could not be attributed.
#[derive(Debug, Default)]
pub struct AttributionOutcome {
    /// Contribution rows, by fund then date then factor (model order)
    pub records: Vec<ContributionRecord>,
    /// Attribution failure per excluded fund
    pub failures: BTreeMap<FundId, ModelError>,
}

/// Decomposes forecast changes into per-factor contributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributionEngine;

impl AttributionEngine {
    /// Create an attribution engine.
    pub const fn new() -> Self {
        Self
    }

    /// Per-factor day-over-day contributions for one fund.
    ///
    /// # Arguments
    /// * `model` - Trained model of the fund
    /// * `market_subset` - Market rows of the forecast horizon; the first row
    ///   is the baseline
    /// * `run_timestamp` - Timestamp of the run
    ///
    /// # Returns
    /// * One record per (date, factor), the first date's contributions being 0
    pub fn decompose(
        &self,
        model: &FundModel,
        market_subset: &MarketSeries,
        run_timestamp: DateTime<Utc>,
    ) -> Result<Vec<ContributionRecord>> {
        if !model.is_trained() {
            return Err(ModelError::ModelNotTrained {
                fund: model.fund().clone(),
            });
        }

        let aligned = model.align(market_subset)?;
        if aligned.is_empty() {
            return Ok(Vec::new());
        }

        let values = aligned.values();
        let baseline = values.row(0);
        let (rows, factors) = values.dim();

        // deltas[[t, j]]: change attributed to factor j on date t
        let mut deltas = Array2::<f64>::zeros((rows, factors));
        for j in 0..factors {
            let mut counterfactual = Array2::<f64>::zeros((rows, factors));
            for mut row in counterfactual.rows_mut() {
                row.assign(&baseline);
            }
            counterfactual.column_mut(j).assign(&values.column(j));

            let predicted = model.predict_values(counterfactual.view())?;
            deltas.column_mut(j).assign(&first_difference(&predicted));
        }

        let mut records = Vec::with_capacity(rows * factors);
        for (t, date) in aligned.dates().iter().enumerate() {
            for (j, factor) in model.factors().iter().enumerate() {
                records.push(ContributionRecord::new(
                    *date,
                    model.fund().clone(),
                    factor.clone(),
                    deltas[[t, j]],
                    run_timestamp,
                ));
            }
        }

        Ok(records)
    }

    /// Decompose every fund's forecast horizon.
    ///
    /// Per-fund failures are returned in [`AttributionOutcome::failures`].
    pub fn decompose_all(
        &self,
        models: &BTreeMap<FundId, FundModel>,
        market: &MarketSeries,
        ratios: &CoverageRatios,
        run_timestamp: DateTime<Utc>,
    ) -> AttributionOutcome {
        let mut outcome = AttributionOutcome::default();
        for (fund, model) in models {
            let result = forecast_horizon(market, ratios, fund)
                .and_then(|subset| self.decompose(model, &subset, run_timestamp));
            match result {
                Ok(records) => {
                    tracing::debug!(fund = %fund, records = records.len(), "Attributed fund");
                    outcome.records.extend(records);
                }
                Err(err) => {
                    tracing::warn!(fund = %fund, error = %err, "Excluding fund from attribution");
                    outcome.failures.insert(fund.clone(), err);
                }
            }
        }
        outcome
    }

    /// Sum contributions per (fund, factor, bin).
    ///
    /// Output rows are dated with the bin label and ordered by fund, bin and
    /// factor name. Each row keeps the run timestamp of its first input row.
    pub fn aggregate(records: &[ContributionRecord], bin: TimeBin) -> Vec<ContributionRecord> {
        let mut sums: BTreeMap<(FundId, NaiveDate, String), (f64, DateTime<Utc>)> =
            BTreeMap::new();
        for record in records {
            let key = (
                record.fund.clone(),
                bin.label(record.date),
                record.factor.clone(),
            );
            sums.entry(key)
                .or_insert((0.0, record.run_timestamp))
                .0 += record.contribution;
        }

        sums.into_iter()
            .map(|((fund, date, factor), (contribution, run_timestamp))| {
                ContributionRecord::new(date, fund, factor, contribution, run_timestamp)
            })
            .collect()
    }
}

fn first_difference(series: &Array1<f64>) -> Array1<f64> {
    let mut diff = Array1::<f64>::zeros(series.len());
    for t in 1..series.len() {
        diff[t] = series[t] - series[t - 1];
    }
    diff
}

/// Outcome of an additivity check.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdditivityReport {
    /// Number of (fund, date) pairs checked
    pub checked: usize,
    /// Largest absolute deviation between summed contributions and the
    /// forecast change
    pub max_abs_deviation: f64,
    /// Largest deviation relative to the forecast level
    pub max_rel_deviation: f64,
    /// (fund, date) of the largest relative deviation
    pub worst: Option<(FundId, NaiveDate)>,
}

impl AdditivityReport {
    /// Whether every deviation is within `tolerance` (relative).
    pub fn holds(&self, tolerance: f64) -> bool {
        self.max_rel_deviation <= tolerance
    }
}

/// Compare summed contributions with day-over-day forecast changes.
///
/// For each fund's date-ordered forecast, the contributions of date `d` must
/// sum to `forecast(d) - forecast(d - 1)`, and to zero on the first date.
/// Deviations are measured relative to `max(|forecast(d)|, |forecast(d-1)|, 1)`.
/// Contributions are expected at daily granularity.
pub fn verify_additivity(
    forecasts: &[ForecastPoint],
    contributions: &[ContributionRecord],
) -> AdditivityReport {
    let mut summed: BTreeMap<(&FundId, NaiveDate), f64> = BTreeMap::new();
    for record in contributions {
        *summed.entry((&record.fund, record.date)).or_insert(0.0) += record.contribution;
    }

    let mut by_fund: BTreeMap<&FundId, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for point in forecasts {
        by_fund
            .entry(&point.fund)
            .or_default()
            .push((point.date, point.predicted_ratio));
    }

    let mut report = AdditivityReport::default();
    for (fund, mut series) in by_fund {
        series.sort_by_key(|(date, _)| *date);
        let mut previous: Option<f64> = None;
        for (date, value) in series {
            let expected = previous.map_or(0.0, |p| value - p);
            let actual = summed.get(&(fund, date)).copied().unwrap_or(0.0);
            let deviation = (actual - expected).abs();
            let scale = previous.map_or(value.abs(), |p| p.abs().max(value.abs())).max(1.0);
            let relative = deviation / scale;

            report.checked += 1;
            report.max_abs_deviation = report.max_abs_deviation.max(deviation);
            if relative > report.max_rel_deviation || report.worst.is_none() {
                report.max_rel_deviation = report.max_rel_deviation.max(relative);
                report.worst = Some((fund.clone(), date));
            }
            previous = Some(value);
        }
    }

    report
}
