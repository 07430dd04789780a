#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/dekking/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod frames;
pub mod summary;

pub use export::{ExportError, ExportFormat, Exporter};
pub use frames::{contribution_frame, contribution_pivot, forecast_frame};
pub use summary::{FactorContribution, FundSummary, summarize_run};
