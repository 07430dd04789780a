#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/dekking/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod maintenance;
pub mod run;

// Re-export main types from sub-crates
pub use dekking_data as data;
pub use dekking_model as model;
pub use dekking_output as output;

pub use config::RunConfig;
pub use error::{Result, RunError};
pub use maintenance::{MaintenanceReport, maintain, purge_old_runs, rotate_backups};
pub use run::{
    ADDITIVITY_TOLERANCE, FundFailure, MemoryPublisher, Publisher, Run, RunReport, RunState,
    StaleDataWarning, run_once,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
