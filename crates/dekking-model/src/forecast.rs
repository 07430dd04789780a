//! Per-fund training and forward forecasting.
//!
//! Training joins each fund's monthly coverage ratios onto the dense daily
//! market table and fits an OLS regression of ratio on every market factor.
//! Prediction applies the fitted model to every market date after the
//! fund's last official publication.
//!
//! Failures that only concern one fund (too few observations, missing
//! factors, no official ratio) are collected per fund and never stop the
//! other funds. Failures of the shared market table are returned as errors.

use crate::error::{ModelError, Result};
use crate::model::{FundModel, TrainingWindow};
use crate::ols::{fit_ols, r_squared};
use crate::split::train_test_split;
use chrono::{DateTime, NaiveDate, Utc};
use dekking_data::{CoverageRatios, ForecastPoint, FundId, MarketSeries};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for model training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Share of joined rows held out for the R² diagnostic (default: 0.25)
    pub test_fraction: f64,
    /// Seed of the train/test shuffle; `None` draws a fresh split every run
    /// (default: 42)
    pub split_seed: Option<u64>,
    /// Minimum joined rows needed to train a fund (default: 2)
    pub min_observations: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.25,
            split_seed: Some(42),
            min_observations: 2,
        }
    }
}

impl ForecastConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(ModelError::InvalidParameter(format!(
                "test_fraction {} must be in [0, 1)",
                self.test_fraction
            )));
        }
        if self.min_observations == 0 {
            return Err(ModelError::InvalidParameter(
                "min_observations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Models trained in one run, plus the funds that could not be trained.
#[derive(Debug, Default)]
pub struct TrainedModels {
    /// Trained model per fund
    pub models: BTreeMap<FundId, FundModel>,
    /// Training failure per excluded fund
    pub failures: BTreeMap<FundId, ModelError>,
}

/// Forecast rows of one run, plus the funds that could not be forecast.
#[derive(Debug, Default)]
pub struct ForecastOutcome {
    /// Forecast rows, grouped by fund and ascending by date
    pub points: Vec<ForecastPoint>,
    /// Prediction failure per excluded fund
    pub failures: BTreeMap<FundId, ModelError>,
}

/// Rows of `market` dated strictly after the fund's last official ratio.
pub fn forecast_horizon(
    market: &MarketSeries,
    ratios: &CoverageRatios,
    fund: &FundId,
) -> Result<MarketSeries> {
    let last_official = ratios
        .last_official_date(fund)
        .ok_or_else(|| ModelError::DataInsufficient {
            fund: fund.clone(),
            required: 1,
            actual: 0,
        })?;
    Ok(market.after(last_official))
}

/// Trains per-fund regressions and produces forward forecasts.
#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    /// Create an engine with the given configuration.
    pub const fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Engine configuration.
    pub const fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Train one model per fund in `ratios`.
    ///
    /// # Errors
    /// Fails for the whole run when the configuration is invalid, `ratios`
    /// holds no fund, or the market table cannot be reindexed. Per-fund
    /// failures are returned in [`TrainedModels::failures`].
    pub fn train(&self, market: &MarketSeries, ratios: &CoverageRatios) -> Result<TrainedModels> {
        self.config.validate()?;
        if ratios.is_empty() {
            return Err(ModelError::NoFunds);
        }

        let dense = market.reindex_daily()?;
        tracing::debug!(
            dates = dense.len(),
            factors = dense.instruments().len(),
            "Reindexed market data to daily calendar"
        );

        let mut trained = TrainedModels::default();
        for fund in ratios.funds() {
            match self.train_fund(&dense, &fund, &ratios.series(&fund)) {
                Ok(model) => {
                    trained.models.insert(fund, model);
                }
                Err(err) => {
                    tracing::warn!(fund = %fund, error = %err, "Excluding fund from run");
                    trained.failures.insert(fund, err);
                }
            }
        }

        Ok(trained)
    }

    /// Train the model of a single fund.
    ///
    /// # Arguments
    /// * `dense` - Daily market table (see [`MarketSeries::reindex_daily`])
    /// * `fund` - Fund being trained
    /// * `series` - The fund's (date, ratio) observations
    pub fn train_fund(
        &self,
        dense: &MarketSeries,
        fund: &FundId,
        series: &[(NaiveDate, f64)],
    ) -> Result<FundModel> {
        // Inner join on date
        let joined: Vec<(usize, NaiveDate, f64)> = series
            .iter()
            .filter_map(|&(date, ratio)| {
                dense
                    .dates()
                    .binary_search(&date)
                    .ok()
                    .map(|row| (row, date, ratio))
            })
            .collect();

        let n = joined.len();
        let required = self.config.min_observations.max(1);
        if n < required {
            return Err(ModelError::DataInsufficient {
                fund: fund.clone(),
                required,
                actual: n,
            });
        }

        let k = dense.instruments().len();
        let mut x = Array2::<f64>::zeros((n, k));
        let mut y = Array1::<f64>::zeros(n);
        for (i, &(row, _, ratio)) in joined.iter().enumerate() {
            x.row_mut(i).assign(&dense.row(row));
            y[i] = ratio;
        }

        let split = train_test_split(n, self.config.test_fraction, self.config.split_seed)?;
        let x_train = x.select(Axis(0), &split.train);
        let y_train = y.select(Axis(0), &split.train);
        let fit = fit_ols(x_train.view(), y_train.view())?;

        let test_r_squared = if split.test.is_empty() {
            None
        } else {
            let x_test = x.select(Axis(0), &split.test);
            let y_test = y.select(Axis(0), &split.test);
            r_squared(y_test.view(), fit.predict(x_test.view()).view())
        };

        let window = TrainingWindow {
            start: joined[0].1,
            end: joined[n - 1].1,
        };

        tracing::info!(
            fund = %fund,
            start = %window.start,
            end = %window.end,
            observations = n,
            train = split.train.len(),
            intercept = fit.intercept,
            coefficients = ?fit.coefficients.to_vec(),
            r_squared = ?test_r_squared,
            "Trained fund model"
        );

        Ok(
            FundModel::new(fund.clone(), dense.instruments().to_vec(), fit.coefficients, fit.intercept)?
                .with_diagnostics(window, n, test_r_squared),
        )
    }

    /// Forecast every fund with a model.
    ///
    /// Per-fund failures are returned in [`ForecastOutcome::failures`].
    pub fn predict(
        &self,
        models: &BTreeMap<FundId, FundModel>,
        market: &MarketSeries,
        ratios: &CoverageRatios,
        run_timestamp: DateTime<Utc>,
    ) -> ForecastOutcome {
        let mut outcome = ForecastOutcome::default();
        for (fund, model) in models {
            match self.predict_fund(model, market, ratios, run_timestamp) {
                Ok(points) => {
                    tracing::debug!(fund = %fund, points = points.len(), "Forecast fund");
                    outcome.points.extend(points);
                }
                Err(err) => {
                    tracing::warn!(fund = %fund, error = %err, "Excluding fund from forecast");
                    outcome.failures.insert(fund.clone(), err);
                }
            }
        }
        outcome
    }

    /// Forecast one fund on every market date after its last official ratio.
    pub fn predict_fund(
        &self,
        model: &FundModel,
        market: &MarketSeries,
        ratios: &CoverageRatios,
        run_timestamp: DateTime<Utc>,
    ) -> Result<Vec<ForecastPoint>> {
        if !model.is_trained() {
            return Err(ModelError::ModelNotTrained {
                fund: model.fund().clone(),
            });
        }
        let horizon = forecast_horizon(market, ratios, model.fund())?;
        let predicted = model.predict(&horizon)?;

        Ok(horizon
            .dates()
            .iter()
            .zip(predicted.iter())
            .map(|(date, value)| {
                ForecastPoint::new(*date, model.fund().clone(), *value, run_timestamp)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use dekking_data::CoverageRatioObservation;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap()
    }

    /// Weekday-only market with two factors over January 2024.
    fn market() -> MarketSeries {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for d in 1..=31 {
            let day = date(d);
            if chrono::Datelike::weekday(&day).number_from_monday() > 5 {
                continue;
            }
            dates.push(day);
            rows.push(2.5 + (f64::from(d) * 0.4).cos() * 0.2);
            rows.push(80.0 + f64::from(d) * 0.3 + (f64::from(d) * 0.7).sin());
        }
        let values = Array2::from_shape_vec((dates.len(), 2), rows).unwrap();
        MarketSeries::new(dates, vec!["EUSA30".to_string(), "IWDA.AS".to_string()], values)
            .unwrap()
    }

    fn true_ratio(market: &MarketSeries, day: NaiveDate) -> f64 {
        // Weekend dates carry Friday's values
        let dense = market.reindex_daily().unwrap();
        40.0 + 8.0 * dense.value_on(day, "EUSA30").unwrap()
            + 0.6 * dense.value_on(day, "IWDA.AS").unwrap()
    }

    #[test]
    fn test_train_recovers_exact_relation() {
        let market = market();
        let observations: Vec<_> = [3, 7, 10, 14, 17, 21, 24, 28]
            .into_iter()
            .map(|d| CoverageRatioObservation::new(date(d), "ABP", true_ratio(&market, date(d))))
            .collect();
        let ratios = CoverageRatios::from_observations(observations);

        let engine = ForecastEngine::default();
        let trained = engine.train(&market, &ratios).unwrap();
        assert!(trained.failures.is_empty());

        let model = &trained.models[&FundId::from("ABP")];
        assert_relative_eq!(model.coefficient("EUSA30").unwrap(), 8.0, epsilon = 1e-6);
        assert_relative_eq!(model.coefficient("IWDA.AS").unwrap(), 0.6, epsilon = 1e-6);
        assert_relative_eq!(model.intercept(), 40.0, epsilon = 1e-4);
        assert_eq!(model.observations(), 8);
        assert_eq!(
            model.training_window(),
            Some(TrainingWindow {
                start: date(3),
                end: date(28)
            })
        );
        assert_relative_eq!(model.test_r_squared().unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weekend_ratio_joins_on_carried_values() {
        // 2024-01-07 is a Sunday: the join must still find a market row
        let market = market();
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(date(7), "PMT", 101.0),
            CoverageRatioObservation::new(date(31), "PMT", 103.0),
        ]);

        let engine = ForecastEngine::new(ForecastConfig {
            test_fraction: 0.0,
            ..ForecastConfig::default()
        });
        let trained = engine.train(&market, &ratios).unwrap();
        assert_eq!(trained.models[&FundId::from("PMT")].observations(), 2);
    }

    #[test]
    fn test_insufficient_fund_is_isolated() {
        let market = market();
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(date(5), "ABP", 110.0),
            CoverageRatioObservation::new(date(12), "ABP", 111.0),
            CoverageRatioObservation::new(date(19), "ABP", 112.0),
            CoverageRatioObservation::new(date(19), "PMT", 100.0),
        ]);

        let engine = ForecastEngine::default();
        let trained = engine.train(&market, &ratios).unwrap();

        assert!(trained.models.contains_key(&FundId::from("ABP")));
        assert!(matches!(
            trained.failures.get(&FundId::from("PMT")),
            Some(ModelError::DataInsufficient {
                required: 2,
                actual: 1,
                ..
            })
        ));

        let outcome = engine.predict(&trained.models, &market, &ratios, run());
        assert!(outcome.failures.is_empty());
        assert!(!outcome.points.is_empty());
        assert!(outcome.points.iter().all(|p| p.fund.as_str() == "ABP"));
    }

    #[test]
    fn test_ratios_outside_market_range_are_dropped() {
        let market = market();
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(), "ABP", 109.0),
            CoverageRatioObservation::new(date(15), "ABP", 110.0),
        ]);

        let engine = ForecastEngine::default();
        let trained = engine.train(&market, &ratios).unwrap();
        assert!(matches!(
            trained.failures.get(&FundId::from("ABP")),
            Some(ModelError::DataInsufficient { actual: 1, .. })
        ));
    }

    #[test]
    fn test_no_funds_is_fatal() {
        let engine = ForecastEngine::default();
        let result = engine.train(&market(), &CoverageRatios::default());
        assert!(matches!(result, Err(ModelError::NoFunds)));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let engine = ForecastEngine::new(ForecastConfig {
            test_fraction: 1.5,
            ..ForecastConfig::default()
        });
        let ratios =
            CoverageRatios::from_observations([CoverageRatioObservation::new(date(5), "ABP", 1.0)]);
        assert!(matches!(
            engine.train(&market(), &ratios),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_predict_domain_and_values() {
        let market = market();
        let ratios = CoverageRatios::from_observations([CoverageRatioObservation::new(
            date(24),
            "ABP",
            112.0,
        )]);
        let model = FundModel::new(
            "ABP",
            vec!["EUSA30".to_string(), "IWDA.AS".to_string()],
            ndarray::array![8.0, 0.6],
            40.0,
        )
        .unwrap();

        let points = ForecastEngine::default()
            .predict_fund(&model, &market, &ratios, run())
            .unwrap();

        let expected: Vec<NaiveDate> = market
            .dates()
            .iter()
            .copied()
            .filter(|d| *d > date(24))
            .collect();
        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        assert_eq!(dates, expected);

        for point in &points {
            let value = 40.0
                + 8.0 * market.value_on(point.date, "EUSA30").unwrap()
                + 0.6 * market.value_on(point.date, "IWDA.AS").unwrap();
            assert_relative_eq!(point.predicted_ratio, value, epsilon = 1e-12);
            assert_eq!(point.run_timestamp, run());
        }
    }

    #[test]
    fn test_predict_without_official_ratio() {
        let model = FundModel::new("BPFBOUW", vec!["EUSA30".to_string()], ndarray::array![1.0], 0.0)
            .unwrap();
        let result = ForecastEngine::default().predict_fund(
            &model,
            &market(),
            &CoverageRatios::default(),
            run(),
        );
        assert!(matches!(result, Err(ModelError::DataInsufficient { actual: 0, .. })));
    }

    #[test]
    fn test_predict_reports_factor_mismatch_per_fund() {
        let market = market();
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(date(10), "ABP", 110.0),
            CoverageRatioObservation::new(date(10), "PMT", 100.0),
        ]);
        let mut models = BTreeMap::new();
        models.insert(
            FundId::from("ABP"),
            FundModel::new("ABP", vec!["IWDA.AS".to_string()], ndarray::array![0.5], 70.0).unwrap(),
        );
        models.insert(
            FundId::from("PMT"),
            FundModel::new("PMT", vec!["GSG".to_string()], ndarray::array![0.5], 70.0).unwrap(),
        );

        let outcome = ForecastEngine::default().predict(&models, &market, &ratios, run());
        assert!(matches!(
            outcome.failures.get(&FundId::from("PMT")),
            Some(ModelError::FactorMismatch { .. })
        ));
        assert!(outcome.points.iter().all(|p| p.fund.as_str() == "ABP"));
    }
}
