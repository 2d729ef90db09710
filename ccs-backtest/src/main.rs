//! # Run a backtest with the default configuration
//! ccs-backtest run --config config/default.toml --data data
//!
//! # Restrict the date window
//! ccs-backtest run --start 2025-01-02 --end 2025-03-31
//!
//! # List the option contracts found for a ticker
//! ccs-backtest contracts --ticker SPY --data data

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ccs_backtest::{BacktestConfig, BacktestEngine, DataLoader, MetricsCalculator};

#[derive(Parser)]
#[command(name = "ccs-backtest")]
#[command(about = "Intraday call credit spread backtester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest and write the trade report
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to data directory (overrides config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output directory for reports and logs (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Underlying ticker (overrides config)
        #[arg(short, long)]
        ticker: Option<String>,

        /// First trading day, YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,

        /// Last trading day, YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,

        /// Hide the progress bar while loading option files
        #[arg(long)]
        no_progress: bool,
    },

    /// List parsed option contracts for a ticker
    Contracts {
        /// Underlying ticker
        #[arg(short, long, default_value = "SPY")]
        ticker: String,

        /// Path to data directory
        #[arg(short, long, default_value = "data")]
        data: PathBuf,
    },
}

fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env().add_directive("ccs_backtest=info".parse()?))
}

/// Log to the console and to `<output>/<strategy>_<timestamp>.log`.
fn init_logging(output_dir: &Path, strategy: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let log_path = output_dir.join(format!(
        "{}_{}.log",
        strategy,
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(log_path)
}

fn parse_date(value: &str, what: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date format: {}", what, value))
}

fn cmd_run(
    config_path: Option<PathBuf>,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    ticker: Option<String>,
    start: Option<String>,
    end: Option<String>,
    no_progress: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => BacktestConfig::from_toml_file(path)?,
        None => BacktestConfig::default(),
    };
    if let Some(data) = data {
        config.data_dir = data;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(ticker) = ticker {
        config.ticker = ticker;
    }
    if let Some(start) = start {
        config.start_date = Some(parse_date(&start, "start")?);
    }
    if let Some(end) = end {
        config.end_date = Some(parse_date(&end, "end")?);
    }
    config.validate()?;

    let log_path = init_logging(&config.output_dir, &config.strategy.name)?;
    info!("Logging to {}", log_path.display());
    info!(
        "Backtesting {} from {} ({} to {})",
        config.ticker,
        config.data_dir.display(),
        config
            .start_date
            .map_or_else(|| "start".to_string(), |d| d.to_string()),
        config
            .end_date
            .map_or_else(|| "end".to_string(), |d| d.to_string()),
    );

    let loader = DataLoader::new(&config.data_dir)
        .with_utc_offset_minutes(config.utc_offset_minutes)
        .with_progress(!no_progress);

    let engine = BacktestEngine::new(config.clone());
    let result = engine
        .run(&loader)
        .with_context(|| format!("Failed to load market data for {}", config.ticker))?;

    let metrics = MetricsCalculator::calculate(&result.ledger);
    let stem = format!("{}_{}", config.strategy.name, result.ticker);

    let report_path = config.output_dir.join(format!("{}_trades.json", stem));
    result
        .ledger
        .write_json(&report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    let summary_path = config.output_dir.join(format!("{}_summary.txt", stem));
    let summary = metrics.summary();
    fs::write(&summary_path, &summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    for (reason, count) in &result.skip_counts {
        info!("Skipped {} day(s): {}", count, reason);
    }
    for (class, count) in &result.skip_class_counts {
        info!("Skipped {} day(s) for {}", count, class.as_str());
    }
    info!("Trade report: {}", report_path.display());
    info!("Summary: {}", summary_path.display());

    println!("{}", summary);
    Ok(())
}

fn cmd_contracts(ticker: &str, data: &Path) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()?).init();

    let loader = DataLoader::new(data);
    let mut contracts = loader
        .index_contracts(ticker)
        .with_context(|| format!("Failed to list option files for {}", ticker))?;
    contracts.sort_by(|(_, a), (_, b)| {
        (a.expiration, a.option_type, a.strike).cmp(&(b.expiration, b.option_type, b.strike))
    });

    println!("{}: {} contracts", ticker, contracts.len());
    for (_, contract) in &contracts {
        println!(
            "  {:<24} {} {} {:>10}",
            contract.identifier,
            contract.expiration,
            contract.option_type.as_str(),
            contract.strike
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
            ticker,
            start,
            end,
            no_progress,
        } => cmd_run(config, data, output, ticker, start, end, no_progress)?,
        Commands::Contracts { ticker, data } => cmd_contracts(&ticker, &data)?,
    }

    Ok(())
}
