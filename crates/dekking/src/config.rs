//! Run configuration.

use crate::error::{Result, RunError};
use dekking_model::{ForecastConfig, TimeBin};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of a scheduled run and of store maintenance.
///
/// Every field has a default, so a JSON file only needs the values it
/// overrides:
///
/// ```
/// use dekking::RunConfig;
///
/// let config = RunConfig::from_json_str(r#"{ "forecast": { "split_seed": 7 } }"#).unwrap();
/// assert_eq!(config.forecast.split_seed, Some(7));
/// assert_eq!(config.forecast.test_fraction, 0.25);
/// assert_eq!(config.max_market_age_days, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Training parameters
    pub forecast: ForecastConfig,
    /// Age in days after which market data is reported as stale (default: 5)
    pub max_market_age_days: i64,
    /// Granularity of contributions in exports and summaries (default: daily)
    pub contribution_bin: TimeBin,
    /// Months of published runs kept by a purge (default: 2)
    pub retention_months: u32,
    /// Days of database backups kept (default: 30)
    pub backup_retention_days: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            max_market_age_days: 5,
            contribution_bin: TimeBin::Daily,
            retention_months: 2,
            backup_retention_days: 30,
        }
    }
}

/// Upper bound for day-valued settings (about a century).
pub const MAX_DAYS: i64 = 36_500;

impl RunConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting is in range.
    pub fn validate(&self) -> Result<()> {
        self.forecast.validate()?;
        for (name, days) in [
            ("max_market_age_days", self.max_market_age_days),
            ("backup_retention_days", self.backup_retention_days),
        ] {
            if !(0..=MAX_DAYS).contains(&days) {
                return Err(RunError::InvalidConfig(format!(
                    "{name} must be between 0 and {MAX_DAYS}, got {days}"
                )));
            }
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
