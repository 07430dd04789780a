//! Housekeeping between runs: database backups and retention of old runs.

use crate::config::RunConfig;
use crate::error::{Result, RunError};
use chrono::{DateTime, Months, Utc};
use dekking_data::store::{backup_database, backup_dir, prune_backups};
use dekking_data::{PurgeStats, SqliteStore};
use std::path::{Path, PathBuf};

/// Outcome of a maintenance pass.
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    /// Backup written in this pass
    pub backup: Option<PathBuf>,
    /// Expired backups removed
    pub removed_backups: Vec<PathBuf>,
    /// Rows removed from the run tables
    pub purged: PurgeStats,
}

/// Delete runs older than `retention_months` before `now`.
pub fn purge_old_runs(
    store: &SqliteStore,
    now: DateTime<Utc>,
    retention_months: u32,
) -> Result<PurgeStats> {
    let cutoff = now
        .checked_sub_months(Months::new(retention_months))
        .ok_or(RunError::InvalidRetention { months: retention_months })?;
    Ok(store.purge_runs_before(cutoff)?)
}

/// Back up the database file and drop backups past their retention.
pub fn rotate_backups(
    db_path: &Path,
    now: DateTime<Utc>,
    retention_days: i64,
) -> Result<(PathBuf, Vec<PathBuf>)> {
    let today = now.date_naive();
    let backup = backup_database(db_path, today)?;
    let removed = prune_backups(&backup_dir(db_path), today, retention_days)?;
    if !removed.is_empty() {
        tracing::info!(removed = removed.len(), "Pruned expired backups");
    }
    Ok((backup, removed))
}

/// Full maintenance pass on a file-backed store.
///
/// The backup is taken before old runs are purged.
pub fn maintain(
    store: &SqliteStore,
    db_path: &Path,
    now: DateTime<Utc>,
    config: &RunConfig,
) -> Result<MaintenanceReport> {
    let (backup, removed_backups) = rotate_backups(db_path, now, config.backup_retention_days)?;
    let purged = purge_old_runs(store, now, config.retention_months)?;
    Ok(MaintenanceReport {
        backup: Some(backup),
        removed_backups,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use dekking_data::{ForecastPoint, FundId};
    use tempfile::TempDir;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 6, 0, 0).unwrap()
    }

    fn point(run: DateTime<Utc>) -> ForecastPoint {
        ForecastPoint::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            FundId::from("ABP"),
            110.0,
            run,
        )
    }

    #[test]
    fn test_purge_old_runs() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_forecasts(&[point(at(1, 5))]).unwrap();
        store.put_forecasts(&[point(at(3, 20))]).unwrap();

        let purged = purge_old_runs(&store, at(4, 1), 2).unwrap();
        assert_eq!(purged.predictions, 1);
        assert_eq!(store.latest_run_timestamp().unwrap(), Some(at(3, 20)));
        assert_eq!(store.get_stats().unwrap().runs, 1);
    }

    #[test]
    fn test_maintain_file_store() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("marketdata.db");
        let store = SqliteStore::new(&db_path).unwrap();
        store.put_forecasts(&[point(at(1, 5))]).unwrap();

        let old_backups = backup_dir(&db_path);
        std::fs::create_dir_all(&old_backups).unwrap();
        std::fs::write(old_backups.join("marketdata_20240101.db"), b"old").unwrap();

        let report = maintain(&store, &db_path, at(4, 1), &RunConfig::default()).unwrap();

        let backup = report.backup.unwrap();
        assert!(backup.ends_with("old/marketdata_20240401.db"));
        assert!(backup.exists());
        assert_eq!(report.removed_backups.len(), 1);
        assert_eq!(report.purged.predictions, 1);
    }
}
