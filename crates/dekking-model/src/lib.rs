#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/dekking/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod attribution;
pub mod bins;
pub mod error;
pub mod forecast;
pub mod linalg;
pub mod model;
pub mod ols;
pub mod split;

pub use attribution::{AdditivityReport, AttributionEngine, AttributionOutcome, verify_additivity};
pub use bins::TimeBin;
pub use error::{ModelError, Result};
pub use forecast::{
    ForecastConfig, ForecastEngine, ForecastOutcome, TrainedModels, forecast_horizon,
};
pub use model::{FundModel, TrainingWindow};
pub use ols::{OlsFit, fit_ols, r_squared};
pub use split::{TrainTestSplit, train_test_split};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
