#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/dekking/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod dates;
pub mod error;
pub mod fund;
pub mod import;
pub mod market;
pub mod names;
pub mod ratios;
pub mod records;
pub mod store;

pub use error::{DataError, Result};
pub use fund::FundId;
pub use market::{MarketObservation, MarketSeries};
pub use names::InstrumentNames;
pub use ratios::{CoverageRatioObservation, CoverageRatios};
pub use records::{ContributionRecord, ForecastPoint};
pub use store::{PurgeStats, SqliteStore, StoreStats};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
