//! Dekking CLI binary.
//!
//! Imports market data and official coverage ratios into the local store,
//! runs the daily estimate and prints or exports its results.

mod commands;
mod store_manager;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dekking::RunConfig;
use dekking_model::TimeBin;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dekking")]
#[command(about = "Dekking: daily coverage-ratio estimates for Dutch pension funds", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file (default: platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Run configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, forecast, attribute and publish
    Run {
        /// Date used for the stale-data check (default: today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Seed for the train/test split
        #[arg(long)]
        seed: Option<u64>,

        /// Contribution granularity for the printed summary (daily, weekly, monthly)
        #[arg(long)]
        bin: Option<TimeBin>,

        /// Skip publishing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Import CSV files into the store
    Import {
        /// Market observations (date,name,value)
        #[arg(long)]
        market: Option<PathBuf>,

        /// Official coverage ratios as fractions (date,name,value)
        #[arg(long)]
        ratios: Option<PathBuf>,

        /// Instrument display names (short_name,long_name)
        #[arg(long)]
        names: Option<PathBuf>,
    },

    /// Export the latest run
    Export {
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Output format (csv, json, pretty-json)
        #[arg(long, default_value = "csv")]
        format: String,

        /// Aggregate contributions (daily, weekly, monthly)
        #[arg(long)]
        bin: Option<TimeBin>,
    },

    /// Show the latest estimate per fund
    Summary {
        /// Only this fund
        #[arg(long)]
        fund: Option<String>,

        /// Print Markdown instead of a table
        #[arg(long)]
        markdown: bool,
    },

    /// Back up the database and purge old runs
    Maintain {
        /// Only back up and prune old backups
        #[arg(long)]
        backup: bool,

        /// Only purge old runs
        #[arg(long)]
        purge: bool,
    },

    /// Show store statistics
    Stats,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let config = match &cli.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    let db_path = cli.db.unwrap_or_else(store_manager::default_db_path);

    match cli.command {
        Commands::Run {
            today,
            seed,
            bin,
            dry_run,
        } => {
            let mut config = config;
            if seed.is_some() {
                config.forecast.split_seed = seed;
            }
            if let Some(bin) = bin {
                config.contribution_bin = bin;
            }
            commands::run_model(&db_path, config, today, dry_run)?;
        }
        Commands::Import {
            market,
            ratios,
            names,
        } => {
            commands::import_files(&db_path, market, ratios, names)?;
        }
        Commands::Export {
            out_dir,
            format,
            bin,
        } => {
            let bin = bin.unwrap_or(config.contribution_bin);
            commands::export_latest(&db_path, &out_dir, &format, bin)?;
        }
        Commands::Summary { fund, markdown } => {
            commands::show_summary(&db_path, fund.as_deref(), markdown)?;
        }
        Commands::Maintain { backup, purge } => {
            // Neither flag means both tasks
            let both = !backup && !purge;
            commands::maintain_store(&db_path, &config, backup || both, purge || both)?;
        }
        Commands::Stats => {
            commands::show_stats(&db_path)?;
        }
    }

    Ok(())
}
