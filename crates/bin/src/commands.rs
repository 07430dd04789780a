//! Subcommand implementations.

use crate::store_manager::open_store;
use chrono::{NaiveDate, Utc};
use dekking::{Run, RunConfig, RunReport, purge_old_runs, rotate_backups};
use dekking_data::FundId;
use dekking_data::import::{read_market_file, read_names_file, read_ratio_file};
use dekking_model::{AttributionEngine, TimeBin};
use dekking_output::{ExportFormat, Exporter, FundSummary, summarize_run};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn spinner(message: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Stop the spinner and log when a stage fails.
fn stage<T, E: std::fmt::Display>(
    pb: &ProgressBar,
    name: &str,
    result: Result<T, E>,
) -> Result<T, E> {
    if let Err(e) = &result {
        pb.finish_with_message("Failed!");
        tracing::error!(stage = name, error = %e, "Stage failed");
    }
    result
}

/// Execute one run against the store.
pub(crate) fn run_model(
    db_path: &Path,
    config: RunConfig,
    today: Option<NaiveDate>,
    dry_run: bool,
) -> CliResult {
    let mut store = open_store(db_path)?;
    let names = store.load_instrument_names()?;
    let bin = config.contribution_bin;

    let mut run = Run::new(config, Utc::now());
    if let Some(today) = today {
        run = run.with_run_date(today);
    }

    let pb = spinner("Loading market data and coverage ratios...")?;
    let loaded = store
        .load_market_series()
        .and_then(|market| Ok((market, store.load_coverage_ratios()?)));
    let (market, ratios) = stage(&pb, "load", loaded)?;
    stage(&pb, "load", run.load(market, ratios))?;

    pb.set_message("Training fund models...");
    stage(&pb, "train", run.train())?;
    pb.set_message("Forecasting coverage ratios...");
    stage(&pb, "forecast", run.forecast())?;
    pb.set_message("Attributing changes to factors...");
    stage(&pb, "attribute", run.attribute())?;

    if dry_run {
        pb.finish_with_message("Dry run: results not published");
    } else {
        stage(&pb, "publish", run.publish(&mut store))?;
        pb.finish_with_message(format!(
            "Published {} forecasts and {} contributions",
            run.forecasts().len(),
            run.contributions().len()
        ));
    }

    print_report(run.report());

    if let Some(ratios) = run.ratios() {
        for summary in summarize_run(ratios, run.forecasts(), run.contributions(), &names) {
            print!("{}", summary.to_ascii_table());
        }
    }

    if bin != TimeBin::Daily {
        println!("\nContributions per {} bin:", bin);
        for record in run.binned_contributions() {
            println!(
                "  {} {:<10} {:<12} {:>+10.3}",
                record.date,
                record.fund,
                names.display(&record.factor),
                record.contribution
            );
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\nRun {}: {}", report.run_timestamp, report.state);
    println!(
        "  Funds: {} loaded, {} completed",
        report.funds_loaded,
        report.funds_completed.len()
    );
    if let Some(warning) = &report.stale_data {
        println!("  Warning: {}", warning);
    }
    for failure in &report.failures {
        println!(
            "  Skipped {} at {}: {}",
            failure.fund, failure.stage, failure.error
        );
    }
    if let Some(additivity) = &report.additivity {
        println!(
            "  Additivity: {} dates checked, max relative deviation {:.2e}",
            additivity.checked, additivity.max_rel_deviation
        );
    }
}

/// Import CSV files into the store.
pub(crate) fn import_files(
    db_path: &Path,
    market: Option<PathBuf>,
    ratios: Option<PathBuf>,
    names: Option<PathBuf>,
) -> CliResult {
    if market.is_none() && ratios.is_none() && names.is_none() {
        return Err("Nothing to import: pass --market, --ratios or --names".into());
    }

    let store = open_store(db_path)?;

    if let Some(path) = market {
        let pb = spinner(&format!("Importing market data from {}...", path.display()))?;
        let rows = stage(&pb, "import", read_market_file(&path).and_then(|obs| {
            store.put_market_observations(&obs)
        }))?;
        tracing::info!(file = %path.display(), rows, "Imported market data");
        pb.finish_with_message(format!("Imported {} market observations", rows));
    }
    if let Some(path) = ratios {
        let pb = spinner(&format!("Importing coverage ratios from {}...", path.display()))?;
        let rows = stage(&pb, "import", read_ratio_file(&path).and_then(|obs| {
            store.put_coverage_ratios(&obs)
        }))?;
        tracing::info!(file = %path.display(), rows, "Imported coverage ratios");
        pb.finish_with_message(format!("Imported {} coverage ratios", rows));
    }
    if let Some(path) = names {
        let lookup = read_names_file(&path)?;
        store.put_instrument_names(&lookup)?;
        println!("Imported {} instrument names", lookup.len());
    }

    Ok(())
}

/// Export the latest run to `forecasts.<ext>` and `contributions.<ext>`.
pub(crate) fn export_latest(db_path: &Path, out_dir: &Path, format: &str, bin: TimeBin) -> CliResult {
    let format: ExportFormat = format.parse()?;
    let store = open_store(db_path)?;

    let forecasts = store.load_latest_forecasts()?;
    if forecasts.is_empty() {
        return Err("No published run found".into());
    }
    let contributions = AttributionEngine::aggregate(&store.load_latest_contributions()?, bin);

    std::fs::create_dir_all(out_dir)?;
    let forecast_path = out_dir.join(format!("forecasts.{}", format.extension()));
    let contribution_path = out_dir.join(format!("contributions.{}", format.extension()));
    forecasts.export_to_file(&forecast_path, format)?;
    contributions.export_to_file(&contribution_path, format)?;

    println!("Wrote {} ({} rows)", forecast_path.display(), forecasts.len());
    println!(
        "Wrote {} ({} rows, {} bins)",
        contribution_path.display(),
        contributions.len(),
        bin
    );
    Ok(())
}

/// Print the latest estimate per fund.
pub(crate) fn show_summary(db_path: &Path, fund: Option<&str>, markdown: bool) -> CliResult {
    let store = open_store(db_path)?;
    let ratios = store.load_coverage_ratios()?;
    let forecasts = store.load_latest_forecasts()?;
    let contributions = store.load_latest_contributions()?;
    let names = store.load_instrument_names()?;

    let summaries: Vec<FundSummary> = match fund {
        Some(fund) => FundSummary::build(&FundId::from(fund), &ratios, &forecasts, &contributions, &names)
            .into_iter()
            .collect(),
        None => summarize_run(&ratios, &forecasts, &contributions, &names),
    };

    if summaries.is_empty() {
        println!("No published estimates found");
        return Ok(());
    }

    for summary in &summaries {
        if markdown {
            println!("{}", summary.to_markdown());
        } else {
            print!("{}", summary.to_ascii_table());
        }
    }
    Ok(())
}

/// Back up the database and purge old runs.
pub(crate) fn maintain_store(db_path: &Path, config: &RunConfig, backup: bool, purge: bool) -> CliResult {
    let now = Utc::now();

    if backup {
        let (path, removed) = rotate_backups(db_path, now, config.backup_retention_days)?;
        println!("Backup written to {}", path.display());
        println!("Removed {} expired backups", removed.len());
    }

    if purge {
        let store = open_store(db_path)?;
        let purged = purge_old_runs(&store, now, config.retention_months)?;
        println!(
            "Purged {} forecast and {} contribution rows older than {} months",
            purged.predictions, purged.contributions, config.retention_months
        );
    }

    Ok(())
}

/// Print store statistics.
pub(crate) fn show_stats(db_path: &Path) -> CliResult {
    let store = open_store(db_path)?;
    let stats = store.get_stats()?;

    println!("Store: {}", db_path.display());
    println!("  Market observations:  {}", stats.market_observations);
    println!("  Instruments:          {}", stats.instruments);
    println!("  Coverage ratios:      {}", stats.ratio_observations);
    println!("  Funds:                {}", stats.funds);
    println!("  Stored runs:          {}", stats.runs);
    match store.latest_market_date()? {
        Some(date) => println!("  Latest market date:   {}", date),
        None => println!("  Latest market date:   -"),
    }
    match store.latest_run_timestamp()? {
        Some(ts) => println!("  Latest run:           {}", ts),
        None => println!("  Latest run:           -"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_stage_stops_spinner() {
        let pb = ProgressBar::hidden();
        let result: Result<(), String> = stage(&pb, "train", Err("no funds".to_string()));
        assert!(result.is_err());
        assert!(pb.is_finished());
    }

    #[test]
    fn test_successful_stage_keeps_spinner() {
        let pb = ProgressBar::hidden();
        assert_eq!(stage::<_, String>(&pb, "forecast", Ok(3)), Ok(3));
        assert!(!pb.is_finished());
    }
}
