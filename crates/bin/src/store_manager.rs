//! Location of the local market-data store.

use dekking_data::{DataError, SqliteStore};
use std::path::{Path, PathBuf};

/// Get the default data directory path.
///
/// Uses platform-specific data directories:
/// - Linux: `~/.local/share/dekking/`
/// - macOS: `~/Library/Application Support/dekking/`
/// - Windows: `%APPDATA%\dekking\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dekking")
}

/// Get the default database path.
pub(crate) fn default_db_path() -> PathBuf {
    default_data_dir().join("marketdata.db")
}

/// Open the store, creating the directory if needed.
pub(crate) fn open_store(path: &Path) -> Result<SqliteStore, DataError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    SqliteStore::new(path)
}
