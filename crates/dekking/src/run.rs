//! One scheduled run: load, train, forecast, attribute, publish.
//!
//! A [`Run`] is a strictly forward state machine:
//!
//! `Idle → DataLoaded → ModelsTrained → ForecastReady → ContributionsReady → Published`
//!
//! Calling a stage out of order fails with [`RunError::InvalidTransition`].
//! A fund that fails a stage is dropped from the working set and recorded in
//! the [`RunReport`]; errors of the shared market table abort the run.
//! Runs share no state: every run retrains from the full history.

use crate::config::RunConfig;
use crate::error::{Result, RunError};
use chrono::{DateTime, NaiveDate, Utc};
use dekking_data::{
    ContributionRecord, CoverageRatios, ForecastPoint, FundId, MarketSeries, SqliteStore,
};
use dekking_model::{
    AdditivityReport, AttributionEngine, ForecastEngine, FundModel, ModelError, verify_additivity,
};
use std::collections::BTreeMap;
use std::fmt;

/// Relative tolerance of the additivity check.
pub const ADDITIVITY_TOLERANCE: f64 = 1e-9;

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunState {
    /// Nothing loaded yet
    Idle,
    /// Market and ratio tables loaded
    DataLoaded,
    /// Per-fund models trained
    ModelsTrained,
    /// Forecast table produced
    ForecastReady,
    /// Contribution table produced
    ContributionsReady,
    /// Outputs handed to the publisher (terminal)
    Published,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::DataLoaded => "DataLoaded",
            Self::ModelsTrained => "ModelsTrained",
            Self::ForecastReady => "ForecastReady",
            Self::ContributionsReady => "ContributionsReady",
            Self::Published => "Published",
        };
        f.write_str(name)
    }
}

/// Market data is older than the configured maximum age.
///
/// Never blocks a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleDataWarning {
    /// Latest date in the market table
    pub latest_market_date: NaiveDate,
    /// Date of the run
    pub run_date: NaiveDate,
    /// Days between the two
    pub age_days: i64,
    /// Configured maximum age
    pub max_age_days: i64,
}

impl StaleDataWarning {
    /// Check the market table's latest date against the run date.
    pub fn check(latest_market_date: NaiveDate, run_date: NaiveDate, max_age_days: i64) -> Option<Self> {
        let age_days = (run_date - latest_market_date).num_days();
        (age_days > max_age_days).then_some(Self {
            latest_market_date,
            run_date,
            age_days,
            max_age_days,
        })
    }
}

impl fmt::Display for StaleDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "market data ends {} ({} days before {}, limit {})",
            self.latest_market_date, self.age_days, self.run_date, self.max_age_days
        )
    }
}

/// A fund dropped from the run.
#[derive(Debug)]
pub struct FundFailure {
    /// Fund
    pub fund: FundId,
    /// Stage the fund failed to reach
    pub stage: RunState,
    /// Cause
    pub error: ModelError,
}

/// What happened during a run.
#[derive(Debug)]
pub struct RunReport {
    /// Run timestamp
    pub run_timestamp: DateTime<Utc>,
    /// Last state reached
    pub state: RunState,
    /// Funds in the ratio table
    pub funds_loaded: usize,
    /// Funds still in the working set
    pub funds_completed: Vec<FundId>,
    /// Funds dropped, in order of failure
    pub failures: Vec<FundFailure>,
    /// Stale market data, if detected
    pub stale_data: Option<StaleDataWarning>,
    /// Number of forecast rows
    pub forecast_rows: usize,
    /// Number of contribution rows
    pub contribution_rows: usize,
    /// Additivity of contributions against forecasts
    pub additivity: Option<AdditivityReport>,
}

impl RunReport {
    fn new(run_timestamp: DateTime<Utc>) -> Self {
        Self {
            run_timestamp,
            state: RunState::Idle,
            funds_loaded: 0,
            funds_completed: Vec::new(),
            failures: Vec::new(),
            stale_data: None,
            forecast_rows: 0,
            contribution_rows: 0,
            additivity: None,
        }
    }

    /// Failure recorded for a fund.
    pub fn failure(&self, fund: &FundId) -> Option<&FundFailure> {
        self.failures.iter().find(|f| &f.fund == fund)
    }
}

/// Receives the outputs of a completed run.
pub trait Publisher {
    /// Persist or forward one run's forecasts and contributions.
    ///
    /// # Errors
    ///
    /// Returns an error if the outputs cannot be stored.
    fn publish(
        &mut self,
        forecasts: &[ForecastPoint],
        contributions: &[ContributionRecord],
    ) -> Result<()>;
}

impl Publisher for SqliteStore {
    fn publish(
        &mut self,
        forecasts: &[ForecastPoint],
        contributions: &[ContributionRecord],
    ) -> Result<()> {
        self.put_forecasts(forecasts)?;
        self.put_contributions(contributions)?;
        Ok(())
    }
}

/// In-memory publisher collecting every published row.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    /// Published forecasts
    pub forecasts: Vec<ForecastPoint>,
    /// Published contributions
    pub contributions: Vec<ContributionRecord>,
}

impl Publisher for MemoryPublisher {
    fn publish(
        &mut self,
        forecasts: &[ForecastPoint],
        contributions: &[ContributionRecord],
    ) -> Result<()> {
        self.forecasts.extend_from_slice(forecasts);
        self.contributions.extend_from_slice(contributions);
        Ok(())
    }
}

/// State of one run.
#[derive(Debug)]
pub struct Run {
    config: RunConfig,
    run_date: NaiveDate,
    state: RunState,
    market: Option<MarketSeries>,
    ratios: Option<CoverageRatios>,
    models: BTreeMap<FundId, FundModel>,
    forecasts: Vec<ForecastPoint>,
    contributions: Vec<ContributionRecord>,
    report: RunReport,
}

impl Run {
    /// Start a run at `run_timestamp`; the run date is its UTC date.
    pub fn new(config: RunConfig, run_timestamp: DateTime<Utc>) -> Self {
        Self {
            config,
            run_date: run_timestamp.date_naive(),
            state: RunState::Idle,
            market: None,
            ratios: None,
            models: BTreeMap::new(),
            forecasts: Vec::new(),
            contributions: Vec::new(),
            report: RunReport::new(run_timestamp),
        }
    }

    /// Override the date used for the stale-data check.
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    /// Current state.
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Run configuration.
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run timestamp.
    pub const fn run_timestamp(&self) -> DateTime<Utc> {
        self.report.run_timestamp
    }

    /// Run report so far.
    pub const fn report(&self) -> &RunReport {
        &self.report
    }

    /// Consume the run, keeping its report.
    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Trained models of the funds still in the working set.
    pub const fn models(&self) -> &BTreeMap<FundId, FundModel> {
        &self.models
    }

    /// Forecast table.
    pub fn forecasts(&self) -> &[ForecastPoint] {
        &self.forecasts
    }

    /// Contribution table (daily).
    pub fn contributions(&self) -> &[ContributionRecord] {
        &self.contributions
    }

    /// Contributions aggregated with the configured bin.
    pub fn binned_contributions(&self) -> Vec<ContributionRecord> {
        AttributionEngine::aggregate(&self.contributions, self.config.contribution_bin)
    }

    /// Loaded ratio table.
    pub const fn ratios(&self) -> Option<&CoverageRatios> {
        self.ratios.as_ref()
    }

    /// Loaded market table.
    pub const fn market(&self) -> Option<&MarketSeries> {
        self.market.as_ref()
    }

    fn advance(&self, from: RunState, to: RunState) -> Result<()> {
        if self.state != from {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %from, to = %to, "Run stage");
        Ok(())
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        self.report.state = state;
        self.report.funds_completed = self.models.keys().cloned().collect();
    }

    fn drop_fund(&mut self, fund: FundId, stage: RunState, error: ModelError) {
        tracing::warn!(fund = %fund, stage = %stage, error = %error, "Fund dropped from run");
        self.models.remove(&fund);
        self.forecasts.retain(|p| p.fund != fund);
        self.contributions.retain(|r| r.fund != fund);
        self.report.failures.push(FundFailure { fund, stage, error });
    }

    /// Load the run's input snapshot.
    ///
    /// Stale market data is logged and recorded, never rejected.
    pub fn load(&mut self, market: MarketSeries, ratios: CoverageRatios) -> Result<()> {
        self.advance(RunState::Idle, RunState::DataLoaded)?;

        let stale = market.latest_date().and_then(|latest| {
            StaleDataWarning::check(latest, self.run_date, self.config.max_market_age_days)
        });
        if let Some(warning) = stale {
            tracing::warn!(%warning, "Stale market data");
            self.report.stale_data = Some(warning);
        }

        tracing::info!(
            dates = market.len(),
            factors = market.instruments().len(),
            funds = ratios.funds().len(),
            "Loaded run data"
        );
        self.report.funds_loaded = ratios.funds().len();
        self.market = Some(market);
        self.ratios = Some(ratios);
        self.enter(RunState::DataLoaded);
        Ok(())
    }

    /// Train one model per fund.
    ///
    /// # Errors
    /// Fails when no fund is loaded or the market table cannot be reindexed.
    pub fn train(&mut self) -> Result<()> {
        self.advance(RunState::DataLoaded, RunState::ModelsTrained)?;
        let (Some(market), Some(ratios)) = (&self.market, &self.ratios) else {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to: RunState::ModelsTrained,
            });
        };

        let engine = ForecastEngine::new(self.config.forecast.clone());
        let trained = engine.train(market, ratios)?;

        self.models = trained.models;
        for (fund, error) in trained.failures {
            self.drop_fund(fund, RunState::ModelsTrained, error);
        }
        self.enter(RunState::ModelsTrained);
        Ok(())
    }

    /// Forecast every trained fund.
    pub fn forecast(&mut self) -> Result<()> {
        self.advance(RunState::ModelsTrained, RunState::ForecastReady)?;
        let (Some(market), Some(ratios)) = (&self.market, &self.ratios) else {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to: RunState::ForecastReady,
            });
        };

        let engine = ForecastEngine::new(self.config.forecast.clone());
        let outcome = engine.predict(&self.models, market, ratios, self.report.run_timestamp);

        self.forecasts = outcome.points;
        for (fund, error) in outcome.failures {
            self.drop_fund(fund, RunState::ForecastReady, error);
        }
        self.report.forecast_rows = self.forecasts.len();
        self.enter(RunState::ForecastReady);
        Ok(())
    }

    /// Decompose every fund's forecast into factor contributions.
    pub fn attribute(&mut self) -> Result<()> {
        self.advance(RunState::ForecastReady, RunState::ContributionsReady)?;
        let (Some(market), Some(ratios)) = (&self.market, &self.ratios) else {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to: RunState::ContributionsReady,
            });
        };

        let outcome = AttributionEngine::new().decompose_all(
            &self.models,
            market,
            ratios,
            self.report.run_timestamp,
        );

        self.contributions = outcome.records;
        for (fund, error) in outcome.failures {
            self.drop_fund(fund, RunState::ContributionsReady, error);
        }

        let additivity = verify_additivity(&self.forecasts, &self.contributions);
        if !additivity.holds(ADDITIVITY_TOLERANCE) {
            tracing::warn!(
                max_rel_deviation = additivity.max_rel_deviation,
                worst = ?additivity.worst,
                "Contributions do not add up to forecast changes"
            );
        }
        self.report.additivity = Some(additivity);
        self.report.forecast_rows = self.forecasts.len();
        self.report.contribution_rows = self.contributions.len();
        self.enter(RunState::ContributionsReady);
        Ok(())
    }

    /// Hand the outputs to a publisher.
    pub fn publish(&mut self, publisher: &mut dyn Publisher) -> Result<()> {
        self.advance(RunState::ContributionsReady, RunState::Published)?;
        publisher.publish(&self.forecasts, &self.contributions)?;
        tracing::info!(
            forecasts = self.forecasts.len(),
            contributions = self.contributions.len(),
            run = %self.report.run_timestamp,
            "Published run"
        );
        self.enter(RunState::Published);
        Ok(())
    }
}

/// Execute a full run; publishes when a publisher is given.
///
/// Without a publisher the run stops at [`RunState::ContributionsReady`].
pub fn run_once(
    config: RunConfig,
    market: MarketSeries,
    ratios: CoverageRatios,
    run_timestamp: DateTime<Utc>,
    publisher: Option<&mut dyn Publisher>,
) -> Result<Run> {
    let mut run = Run::new(config, run_timestamp);
    run.load(market, ratios)?;
    run.train()?;
    run.forecast()?;
    run.attribute()?;
    if let Some(publisher) = publisher {
        run.publish(publisher)?;
    }
    Ok(run)
}
