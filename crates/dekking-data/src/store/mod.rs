//! Persistent storage for market data, coverage ratios and run outputs.

pub mod backup;
pub mod sqlite;

pub use backup::{backup_database, backup_dir, prune_backups};
pub use sqlite::{PurgeStats, SqliteStore, StoreStats};
