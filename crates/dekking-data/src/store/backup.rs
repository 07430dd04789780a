//! Dated database backups.
//!
//! Backups are plain file copies named `<stem>_YYYYMMDD.db` in an `old/`
//! directory next to the database.

use crate::error::{DataError, Result};
use chrono::{Days, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the backup directory created next to the database.
pub const BACKUP_DIR: &str = "old";

/// Directory holding backups of `db_path`.
pub fn backup_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from(BACKUP_DIR), |p| p.join(BACKUP_DIR))
}

/// Copy the database to `old/<stem>_YYYYMMDD.db`.
///
/// A backup taken twice on the same day overwrites the earlier copy.
pub fn backup_database(db_path: &Path, today: NaiveDate) -> Result<PathBuf> {
    if !db_path.exists() {
        return Err(DataError::Backup(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DataError::Backup(format!("Invalid database path: {}", db_path.display())))?;

    let dir = backup_dir(db_path);
    fs::create_dir_all(&dir)?;

    let target = dir.join(format!("{}_{}.db", stem, today.format("%Y%m%d")));
    fs::copy(db_path, &target)?;

    tracing::info!(backup = %target.display(), "Database backed up");
    Ok(target)
}

/// Date encoded in a backup file name, if it follows the naming scheme.
fn backup_date(path: &Path) -> Option<NaiveDate> {
    if path.extension().and_then(|e| e.to_str()) != Some("db") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, stamp) = stem.rsplit_once('_')?;
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

/// Remove backups older than `retention_days`.
///
/// Files that do not follow the backup naming scheme are left alone.
/// A negative or out-of-range retention is an error.
pub fn prune_backups(dir: &Path, today: NaiveDate, retention_days: i64) -> Result<Vec<PathBuf>> {
    let cutoff = u64::try_from(retention_days)
        .ok()
        .and_then(|days| today.checked_sub_days(Days::new(days)))
        .ok_or_else(|| {
            DataError::Backup(format!("Invalid backup retention: {retention_days} days"))
        })?;

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(date) = backup_date(&path) else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(&path)?;
            tracing::debug!(backup = %path.display(), "Removed expired backup");
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}
