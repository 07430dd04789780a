//! Error types for model operations.

use dekking_data::{DataError, FundId};
use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while training, predicting or attributing.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Too few joined (market, ratio) rows to train a fund's model
    #[error("Insufficient data for {fund}: need at least {required} observations, got {actual}")]
    DataInsufficient {
        /// Fund
        fund: FundId,
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Prediction or decomposition requested for an untrained model
    #[error("Model for {fund} has not been trained")]
    ModelNotTrained {
        /// Fund
        fund: FundId,
    },

    /// A model factor is missing from the market table
    #[error("Factor {factor} of the {fund} model is not in the market table")]
    FactorMismatch {
        /// Fund
        fund: FundId,
        /// Missing factor
        factor: String,
    },

    /// The ratio table holds no funds
    #[error("No funds in the coverage-ratio table")]
    NoFunds,

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Numerical failure in the least-squares solver
    #[error("Solver error: {0}")]
    Solver(String),

    /// Invalid configuration value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from the data layer (e.g. market reindexing)
    #[error(transparent)]
    Data(#[from] DataError),
}
