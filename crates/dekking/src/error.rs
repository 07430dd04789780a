//! Error types for runs.

use crate::run::RunState;
use dekking_data::DataError;
use dekking_model::ModelError;
use dekking_output::ExportError;
use thiserror::Error;

/// Result type for run operations.
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors that stop a run or a maintenance task.
#[derive(Debug, Error)]
pub enum RunError {
    /// Data layer error
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Model error affecting the whole run
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Export error
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stage requested out of order
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },

    /// Retention period reaches before the representable date range
    #[error("Retention of {months} months is out of range")]
    InvalidRetention {
        /// Configured retention
        months: u32,
    },
}
