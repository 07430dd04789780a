//! Ordinary least squares with intercept.

use crate::error::{ModelError, Result};
use crate::linalg::solve_symmetric;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Fitted coefficients of a linear regression.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// One coefficient per regressor column
    pub coefficients: Array1<f64>,
    /// Intercept
    pub intercept: f64,
}

impl OlsFit {
    /// Predicted values for each row of `x`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

/// Centred columns with a norm below this fraction of their raw magnitude
/// are treated as constant.
const CONSTANT_COLUMN_TOL: f64 = 1e-10;

/// Regress `y` on the columns of `x` with an intercept.
///
/// The data is centred and every column is scaled to unit norm, so the
/// slope solves `ZᵀZ c = Zᵀyc` with `b = c / ‖xc‖` and the intercept is
/// `ȳ - x̄·b`. Constant columns get a zero slope. A rank-deficient design
/// gets the minimum-norm solution in the scaled space; with a single row
/// every slope is zero and the intercept equals that row's target.
pub fn fit_ols(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<OlsFit> {
    if x.nrows() != y.len() {
        return Err(ModelError::DimensionMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }

    let (Some(x_mean), Some(y_mean)) = (x.mean_axis(Axis(0)), y.mean()) else {
        return Err(ModelError::Solver("no observations to fit".to_string()));
    };

    let rows = (x.nrows() as f64).sqrt();
    let mut z = &x - &x_mean;
    let mut scales = Array1::<f64>::ones(x.ncols());
    for (j, mut column) in z.axis_iter_mut(Axis(1)).enumerate() {
        let norm = column.dot(&column).sqrt();
        let magnitude = x.column(j).iter().fold(0.0_f64, |m, v| m.max(v.abs())) * rows;
        if norm > CONSTANT_COLUMN_TOL * magnitude {
            column.mapv_inplace(|v| v / norm);
            scales[j] = norm;
        } else {
            column.fill(0.0);
        }
    }
    let yc = &y - y_mean;

    let gram = z.t().dot(&z);
    let rhs = z.t().dot(&yc);
    let coefficients = solve_symmetric(&gram, &rhs)? / &scales;

    let intercept = y_mean - x_mean.dot(&coefficients);
    if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
        return Err(ModelError::Solver(
            "regression produced non-finite coefficients".to_string(),
        ));
    }

    Ok(OlsFit {
        coefficients,
        intercept,
    })
}

/// Coefficient of determination of `predicted` against `actual`.
///
/// `None` when there are fewer than two points or `actual` is constant.
pub fn r_squared(actual: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> Option<f64> {
    if actual.len() < 2 || actual.len() != predicted.len() {
        return None;
    }
    let mean = actual.mean()?;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}
