//! Per-fund linear coverage-ratio model.

use crate::error::{ModelError, Result};
use chrono::NaiveDate;
use dekking_data::{FundId, MarketSeries};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// First and last date of a fund's joined training table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    /// Earliest joined date
    pub start: NaiveDate,
    /// Latest joined date
    pub end: NaiveDate,
}

/// Linear model of one fund's coverage ratio on market-factor levels.
///
/// `ratio = intercept + Σ coefficient_i · factor_i`
#[derive(Debug, Clone, PartialEq)]
pub struct FundModel {
    fund: FundId,
    factors: Vec<String>,
    coefficients: Array1<f64>,
    intercept: f64,
    training_window: Option<TrainingWindow>,
    observations: usize,
    test_r_squared: Option<f64>,
}

impl FundModel {
    /// Create a model from fitted parameters.
    ///
    /// # Errors
    /// Fails when the number of coefficients does not match the factors.
    pub fn new(
        fund: impl Into<FundId>,
        factors: Vec<String>,
        coefficients: Array1<f64>,
        intercept: f64,
    ) -> Result<Self> {
        if factors.len() != coefficients.len() {
            return Err(ModelError::DimensionMismatch {
                expected: factors.len(),
                actual: coefficients.len(),
            });
        }
        Ok(Self {
            fund: fund.into(),
            factors,
            coefficients,
            intercept,
            training_window: None,
            observations: 0,
            test_r_squared: None,
        })
    }

    /// A placeholder for a fund whose model has not been fitted.
    pub fn untrained(fund: impl Into<FundId>, factors: Vec<String>) -> Self {
        Self {
            fund: fund.into(),
            factors,
            coefficients: Array1::zeros(0),
            intercept: 0.0,
            training_window: None,
            observations: 0,
            test_r_squared: None,
        }
    }

    /// Attach training diagnostics.
    pub fn with_diagnostics(
        mut self,
        training_window: TrainingWindow,
        observations: usize,
        test_r_squared: Option<f64>,
    ) -> Self {
        self.training_window = Some(training_window);
        self.observations = observations;
        self.test_r_squared = test_r_squared;
        self
    }

    /// Fund the model belongs to.
    pub const fn fund(&self) -> &FundId {
        &self.fund
    }

    /// Factor columns, in coefficient order.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// Fitted coefficients (empty when untrained).
    pub const fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Coefficient of one factor.
    pub fn coefficient(&self, factor: &str) -> Option<f64> {
        let i = self.factors.iter().position(|f| f == factor)?;
        self.coefficients.get(i).copied()
    }

    /// Fitted intercept.
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Joined date range the model was trained on.
    pub const fn training_window(&self) -> Option<TrainingWindow> {
        self.training_window
    }

    /// Number of joined rows (train and test).
    pub const fn observations(&self) -> usize {
        self.observations
    }

    /// R² on the held-out rows, when defined.
    pub const fn test_r_squared(&self) -> Option<f64> {
        self.test_r_squared
    }

    /// Whether the model has coefficients for its factors.
    pub fn is_trained(&self) -> bool {
        !self.factors.is_empty() && self.coefficients.len() == self.factors.len()
    }

    fn ensure_trained(&self) -> Result<()> {
        if self.is_trained() {
            Ok(())
        } else {
            Err(ModelError::ModelNotTrained {
                fund: self.fund.clone(),
            })
        }
    }

    /// Predicted ratio for one row of factor values in model order.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        self.ensure_trained()?;
        if row.len() != self.coefficients.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.coefficients.len(),
                actual: row.len(),
            });
        }
        Ok(self.intercept + row.dot(&self.coefficients))
    }

    /// Restrict and reorder a market table to the model's factors.
    pub fn align(&self, market: &MarketSeries) -> Result<MarketSeries> {
        if let Some(factor) = self
            .factors
            .iter()
            .find(|f| market.instrument_index(f).is_none())
        {
            return Err(ModelError::FactorMismatch {
                fund: self.fund.clone(),
                factor: factor.clone(),
            });
        }
        Ok(market.select(&self.factors)?)
    }

    /// Predicted ratio for each row of a factor matrix in model order.
    pub fn predict_values(&self, values: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.ensure_trained()?;
        if values.ncols() != self.coefficients.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.coefficients.len(),
                actual: values.ncols(),
            });
        }
        Ok(values.dot(&self.coefficients) + self.intercept)
    }

    /// Predicted ratio for every row of `market`.
    pub fn predict(&self, market: &MarketSeries) -> Result<Array1<f64>> {
        self.ensure_trained()?;
        let aligned = self.align(market)?;
        self.predict_values(aligned.values().view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn market() -> MarketSeries {
        MarketSeries::new(
            vec![date(1), date(2)],
            vec!["EUSA30".to_string(), "GSG".to_string(), "IWDA.AS".to_string()],
            array![[2.5, 15.0, 80.0], [2.6, 15.5, 81.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_predict_uses_factor_names_not_positions() {
        let model = FundModel::new(
            "ABP",
            vec!["IWDA.AS".to_string(), "EUSA30".to_string()],
            array![0.5, 4.0],
            50.0,
        )
        .unwrap();

        let predicted = model.predict(&market()).unwrap();
        assert_relative_eq!(predicted[0], 50.0 + 0.5 * 80.0 + 4.0 * 2.5);
        assert_relative_eq!(predicted[1], 50.0 + 0.5 * 81.0 + 4.0 * 2.6);
        assert_eq!(model.coefficient("EUSA30"), Some(4.0));
    }

    #[test]
    fn test_missing_factor() {
        let model = FundModel::new("PMT", vec!["EURUSD".to_string()], array![1.0], 0.0).unwrap();
        assert!(matches!(
            model.predict(&market()),
            Err(ModelError::FactorMismatch { factor, .. }) if factor == "EURUSD"
        ));
    }

    #[test]
    fn test_untrained_model() {
        let model = FundModel::untrained("PMT", vec!["GSG".to_string()]);
        assert!(!model.is_trained());
        assert!(matches!(
            model.predict(&market()),
            Err(ModelError::ModelNotTrained { .. })
        ));
        assert!(model.predict_row(array![1.0].view()).is_err());
    }

    #[test]
    fn test_coefficient_count_must_match() {
        let result = FundModel::new("ABP", vec!["GSG".to_string()], array![1.0, 2.0], 0.0);
        assert!(matches!(result, Err(ModelError::DimensionMismatch { .. })));
    }
}
