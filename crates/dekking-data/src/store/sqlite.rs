//! SQLite storage for market data, coverage ratios and run outputs.
//!
//! The schema follows the `marketdata.db` layout consumed by the dashboard:
//! long-format `marketdata` and `dekkingsgraad` tables, a `marketdata_names`
//! lookup, and append-only `dgr_prediction` / `dgr_contribution` tables tagged
//! with the run timestamp (`date_run`). The `*_latest` views expose the most
//! recent run only.

use crate::dates::{DATE_FORMAT, parse_date};
use crate::error::{DataError, Result};
use crate::fund::FundId;
use crate::market::{MarketObservation, MarketSeries};
use crate::names::InstrumentNames;
use crate::ratios::{CoverageRatioObservation, CoverageRatios};
use crate::records::{ContributionRecord, ForecastPoint};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// SQLite store for the coverage-ratio model.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

/// Format a run timestamp for storage.
///
/// A fixed format keeps lexicographic and chronological order identical.
pub fn format_run_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored run timestamp.
pub fn parse_run_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DataError::Parse(format!("Invalid run timestamp '{}': {}", raw, e)))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl SqliteStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS marketdata (
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (date, name)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_marketdata_name_date ON marketdata(name, date)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS marketdata_names (
                short_name TEXT PRIMARY KEY,
                long_name TEXT NOT NULL
            )",
            [],
        )?;

        // Coverage ratios are stored as fractions
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS dekkingsgraad (
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (date, name)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS dgr_prediction (
                date TEXT NOT NULL,
                fund TEXT NOT NULL,
                value REAL NOT NULL,
                date_run TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_prediction_run ON dgr_prediction(date_run)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS dgr_contribution (
                date TEXT NOT NULL,
                fund TEXT NOT NULL,
                factor TEXT NOT NULL,
                value REAL NOT NULL,
                date_run TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contribution_run ON dgr_contribution(date_run)",
            [],
        )?;

        self.conn.execute(
            "CREATE VIEW IF NOT EXISTS dgr_prediction_latest AS
             SELECT date, fund, value, date_run FROM dgr_prediction
             WHERE date_run = (SELECT MAX(date_run) FROM dgr_prediction)",
            [],
        )?;

        self.conn.execute(
            "CREATE VIEW IF NOT EXISTS dgr_contribution_latest AS
             SELECT date, fund, factor, value, date_run FROM dgr_contribution
             WHERE date_run = (SELECT MAX(date_run) FROM dgr_contribution)",
            [],
        )?;

        Ok(())
    }

    /// Store market observations, replacing existing (date, name) values.
    pub fn put_market_observations(&self, observations: &[MarketObservation]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO marketdata (date, name, value) VALUES (?1, ?2, ?3)",
            )?;
            for obs in observations {
                if !obs.value.is_finite() {
                    continue;
                }
                written += stmt.execute(params![format_date(obs.date), obs.instrument, obs.value])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Load all market observations ordered by date.
    pub fn load_market_observations(&self) -> Result<Vec<MarketObservation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, name, value FROM marketdata ORDER BY date, name")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut observations = Vec::new();
        for row in rows {
            let (date, name, value) = row?;
            observations.push(MarketObservation::new(parse_date(&date)?, name, value));
        }
        Ok(observations)
    }

    /// Load the wide, forward-filled market table.
    pub fn load_market_series(&self) -> Result<MarketSeries> {
        let observations = self.load_market_observations()?;
        if observations.is_empty() {
            return Err(DataError::Empty("marketdata table".to_string()));
        }
        MarketSeries::from_observations(&observations)
    }

    /// Most recent date in the market table.
    pub fn latest_market_date(&self) -> Result<Option<NaiveDate>> {
        let raw: Option<String> =
            self.conn
                .query_row("SELECT MAX(date) FROM marketdata", [], |row| row.get(0))?;
        raw.as_deref().map(parse_date).transpose()
    }

    /// Store instrument display names.
    pub fn put_instrument_names(&self, names: &InstrumentNames) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for (short_name, long_name) in names.iter() {
            tx.execute(
                "INSERT OR REPLACE INTO marketdata_names (short_name, long_name) VALUES (?1, ?2)",
                params![short_name, long_name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load instrument display names.
    pub fn load_instrument_names(&self) -> Result<InstrumentNames> {
        let mut stmt = self
            .conn
            .prepare("SELECT short_name, long_name FROM marketdata_names")?;
        let names = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<InstrumentNames, _>>()?;
        Ok(names)
    }

    /// Store coverage ratios (given in percent, stored as fractions).
    pub fn put_coverage_ratios(&self, observations: &[CoverageRatioObservation]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO dekkingsgraad (date, name, value) VALUES (?1, ?2, ?3)",
            )?;
            for obs in observations {
                if !obs.ratio.is_finite() {
                    continue;
                }
                written += stmt.execute(params![
                    format_date(obs.date),
                    obs.fund.as_str(),
                    obs.ratio / 100.0
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Load coverage ratios in percent.
    pub fn load_coverage_ratios(&self) -> Result<CoverageRatios> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, name, value FROM dekkingsgraad ORDER BY date")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut ratios = CoverageRatios::default();
        for row in rows {
            let (date, name, value) = row?;
            ratios.insert(CoverageRatioObservation::new(
                parse_date(&date)?,
                name.as_str(),
                value * 100.0,
            ));
        }
        Ok(ratios)
    }

    /// Append forecast points.
    pub fn put_forecasts(&self, points: &[ForecastPoint]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dgr_prediction (date, fund, value, date_run) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in points {
                stmt.execute(params![
                    format_date(point.date),
                    point.fund.as_str(),
                    point.predicted_ratio,
                    format_run_timestamp(point.run_timestamp)
                ])?;
            }
        }
        tx.commit()?;
        Ok(points.len())
    }

    /// Append contribution records.
    pub fn put_contributions(&self, records: &[ContributionRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dgr_contribution (date, fund, factor, value, date_run)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(params![
                    format_date(record.date),
                    record.fund.as_str(),
                    record.factor,
                    record.contribution,
                    format_run_timestamp(record.run_timestamp)
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Timestamp of the most recent published run.
    pub fn latest_run_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT MAX(date_run) FROM dgr_prediction", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        raw.as_deref().map(parse_run_timestamp).transpose()
    }

    /// Forecast points of the most recent run, by fund then date.
    pub fn load_latest_forecasts(&self) -> Result<Vec<ForecastPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, fund, value, date_run FROM dgr_prediction_latest ORDER BY fund, date",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (date, fund, value, date_run) = row?;
            points.push(ForecastPoint::new(
                parse_date(&date)?,
                FundId::new(fund),
                value,
                parse_run_timestamp(&date_run)?,
            ));
        }
        Ok(points)
    }

    /// Contribution records of the most recent run, by fund, date and factor.
    pub fn load_latest_contributions(&self) -> Result<Vec<ContributionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, fund, factor, value, date_run FROM dgr_contribution_latest
             ORDER BY fund, date, factor",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (date, fund, factor, value, date_run) = row?;
            records.push(ContributionRecord::new(
                parse_date(&date)?,
                FundId::new(fund),
                factor,
                value,
                parse_run_timestamp(&date_run)?,
            ));
        }
        Ok(records)
    }

    /// Delete forecast and contribution rows of runs older than `cutoff`.
    pub fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeStats> {
        let cutoff = format_run_timestamp(cutoff);
        let predictions = self.conn.execute(
            "DELETE FROM dgr_prediction WHERE date_run < ?1",
            params![cutoff],
        )?;
        let contributions = self.conn.execute(
            "DELETE FROM dgr_contribution WHERE date_run < ?1",
            params![cutoff],
        )?;

        tracing::info!(
            predictions,
            contributions,
            cutoff = %cutoff,
            "Purged old model runs"
        );

        Ok(PurgeStats {
            predictions,
            contributions,
        })
    }

    /// Clear all stored data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM marketdata", [])?;
        self.conn.execute("DELETE FROM marketdata_names", [])?;
        self.conn.execute("DELETE FROM dekkingsgraad", [])?;
        self.conn.execute("DELETE FROM dgr_prediction", [])?;
        self.conn.execute("DELETE FROM dgr_contribution", [])?;
        Ok(())
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let market_observations: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM marketdata", [], |row| row.get(0))?;

        let instruments: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT name) FROM marketdata", [], |row| {
                    row.get(0)
                })?;

        let ratio_observations: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM dekkingsgraad", [], |row| row.get(0))?;

        let funds: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT name) FROM dekkingsgraad", [], |row| {
                    row.get(0)
                })?;

        let runs: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT date_run) FROM dgr_prediction",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            market_observations: market_observations as usize,
            instruments: instruments as usize,
            ratio_observations: ratio_observations as usize,
            funds: funds as usize,
            runs: runs as usize,
        })
    }
}

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    /// Forecast rows deleted
    pub predictions: usize,
    /// Contribution rows deleted
    pub contributions: usize,
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Total number of market observations
    pub market_observations: usize,
    /// Number of distinct instruments
    pub instruments: usize,
    /// Total number of coverage-ratio observations
    pub ratio_observations: usize,
    /// Number of distinct funds
    pub funds: usize,
    /// Number of published runs still stored
    pub runs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run_at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_store_initialization() {
        let store = SqliteStore::in_memory().unwrap();
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.market_observations, 0);
        assert_eq!(stats.runs, 0);
        assert!(store.latest_run_timestamp().unwrap().is_none());
        assert!(store.latest_market_date().unwrap().is_none());
    }

    #[test]
    fn test_market_operations() {
        let store = SqliteStore::in_memory().unwrap();
        let observations = vec![
            MarketObservation::new(date(2024, 1, 2), "IWDA.AS", 82.0),
            MarketObservation::new(date(2024, 1, 2), "EUSA30", 2.55),
            MarketObservation::new(date(2024, 1, 3), "IWDA.AS", 82.5),
        ];
        assert_eq!(store.put_market_observations(&observations).unwrap(), 3);

        let series = store.load_market_series().unwrap();
        assert_eq!(series.len(), 2);
        // EUSA30 is forward-filled into 2024-01-03
        assert_eq!(series.value_on(date(2024, 1, 3), "EUSA30"), Some(2.55));
        assert_eq!(store.latest_market_date().unwrap(), Some(date(2024, 1, 3)));

        // Re-inserting a (date, name) replaces the value
        store
            .put_market_observations(&[MarketObservation::new(date(2024, 1, 3), "IWDA.AS", 83.0)])
            .unwrap();
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.market_observations, 3);
        assert_eq!(stats.instruments, 2);
    }

    #[test]
    fn test_coverage_ratios_are_scaled() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_coverage_ratios(&[CoverageRatioObservation::new(date(2024, 1, 31), "ABP", 110.5)])
            .unwrap();

        let raw: f64 = store
            .conn
            .query_row("SELECT value FROM dekkingsgraad", [], |row| row.get(0))
            .unwrap();
        assert_relative_eq!(raw, 1.105, epsilon = 1e-12);

        let ratios = store.load_coverage_ratios().unwrap();
        let (_, ratio) = ratios.last_official(&FundId::from("ABP")).unwrap();
        assert_relative_eq!(ratio, 110.5, epsilon = 1e-9);
    }

    #[test]
    fn test_instrument_names() {
        let store = SqliteStore::in_memory().unwrap();
        let mut names = InstrumentNames::new();
        names.insert("EUSA30", "Euro swap 30Y");
        store.put_instrument_names(&names).unwrap();

        assert_eq!(store.load_instrument_names().unwrap(), names);
    }

    #[test]
    fn test_latest_views_return_most_recent_run() {
        let store = SqliteStore::in_memory().unwrap();
        let fund = FundId::from("ABP");

        for (day, value) in [(1, 110.0), (2, 111.0)] {
            let run = run_at(day);
            store
                .put_forecasts(&[ForecastPoint::new(date(2024, 2, 1), fund.clone(), value, run)])
                .unwrap();
            store
                .put_contributions(&[ContributionRecord::new(
                    date(2024, 2, 1),
                    fund.clone(),
                    "IWDA.AS".to_string(),
                    value / 100.0,
                    run,
                )])
                .unwrap();
        }

        assert_eq!(store.latest_run_timestamp().unwrap(), Some(run_at(2)));

        let forecasts = store.load_latest_forecasts().unwrap();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].predicted_ratio, 111.0);
        assert_eq!(forecasts[0].run_timestamp, run_at(2));

        let contributions = store.load_latest_contributions().unwrap();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].factor, "IWDA.AS");
        assert_eq!(store.get_stats().unwrap().runs, 2);
    }

    #[test]
    fn test_purge_runs_before() {
        let store = SqliteStore::in_memory().unwrap();
        let fund = FundId::from("PMT");
        for day in [1, 10, 20] {
            store
                .put_forecasts(&[ForecastPoint::new(date(2024, 2, 1), fund.clone(), 100.0, run_at(day))])
                .unwrap();
        }

        let stats = store.purge_runs_before(run_at(10)).unwrap();
        assert_eq!(stats.predictions, 1);
        assert_eq!(stats.contributions, 0);
        assert_eq!(store.get_stats().unwrap().runs, 2);
    }

    #[test]
    fn test_run_timestamp_format_round_trip() {
        let ts = run_at(5);
        let raw = format_run_timestamp(ts);
        assert_eq!(raw, "2024-03-05T06:00:00.000000Z");
        assert_eq!(parse_run_timestamp(&raw).unwrap(), ts);
    }

    #[test]
    fn test_clear_all() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_market_observations(&[MarketObservation::new(date(2024, 1, 2), "GSG", 15.0)])
            .unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.get_stats().unwrap().market_observations, 0);
    }
}
