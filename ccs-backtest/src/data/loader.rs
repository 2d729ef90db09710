//! Data loader for partitioned parquet price files.
//!
//! Expected layout under the data directory:
//! - `equity/<TICKER>/*.parquet`: underlying bars, any partitioning
//!   (the reference data set uses one file per month)
//! - `options/<TICKER>/<IDENTIFIER>.parquet`: one file per option contract
//!
//! Every file carries at least:
//! - `ts`: epoch milliseconds (or a parquet datetime column)
//! - `c`: close price
//!
//! Other OHLC columns are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use rayon::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::contract::{identifier_from_path, parse_identifier};
use super::market::MarketData;
use super::types::{OptionContract, OptionQuote, PricePoint};

/// Timestamp column name.
pub const TS_COLUMN: &str = "ts";

/// Close price column name.
pub const CLOSE_COLUMN: &str = "c";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No underlying price data for {0}")]
    NoEquityData(String),

    #[error("No option data for {0}")]
    NoOptionData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet data loader for one data directory.
pub struct DataLoader {
    data_dir: PathBuf,
    utc_offset: Duration,
    show_progress: bool,
}

impl DataLoader {
    /// Create a loader rooted at `data_dir`. Timestamps are kept in UTC.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            utc_offset: Duration::zero(),
            show_progress: false,
        }
    }

    /// Shift all timestamps by a fixed offset from UTC.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset = Duration::minutes(i64::from(minutes));
        self
    }

    /// Show a progress bar while reading option files.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn equity_dir(&self, ticker: &str) -> PathBuf {
        self.data_dir.join("equity").join(ticker)
    }

    fn options_dir(&self, ticker: &str) -> PathBuf {
        self.data_dir.join("options").join(ticker)
    }

    /// Parquet files for the underlying, sorted by name.
    pub fn equity_files(&self, ticker: &str) -> Result<Vec<PathBuf>, LoaderError> {
        parquet_files(&self.equity_dir(ticker))
    }

    /// Parquet files for the option chain, sorted by name.
    pub fn option_files(&self, ticker: &str) -> Result<Vec<PathBuf>, LoaderError> {
        parquet_files(&self.options_dir(ticker))
    }

    /// Read one price file into points, skipping rows with a missing
    /// timestamp or close.
    pub fn read_price_file(&self, path: &Path) -> Result<Vec<PricePoint>, LoaderError> {
        let df = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?
            .select([col(TS_COLUMN), col(CLOSE_COLUMN)])
            .collect()?;
        frame_to_points(&df, self.utc_offset)
    }

    /// Load the full underlying series for a ticker.
    pub fn load_underlying(&self, ticker: &str) -> Result<Vec<PricePoint>, LoaderError> {
        let files = self.equity_files(ticker)?;
        if files.is_empty() {
            return Err(LoaderError::NoEquityData(ticker.to_string()));
        }

        let mut points = Vec::new();
        for path in &files {
            let mut rows = self.read_price_file(path)?;
            debug!("Read {} underlying rows from {}", rows.len(), path.display());
            points.append(&mut rows);
        }

        if points.is_empty() {
            return Err(LoaderError::NoEquityData(ticker.to_string()));
        }
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    /// Parse contract identifiers from the option file names.
    ///
    /// Files whose names do not parse are logged and left out.
    pub fn index_contracts(&self, ticker: &str) -> Result<Vec<(PathBuf, OptionContract)>, LoaderError> {
        let files = self.option_files(ticker)?;
        let mut indexed = Vec::with_capacity(files.len());

        for path in files {
            let Some(identifier) = identifier_from_path(&path) else {
                warn!("Skipping option file with unreadable name: {}", path.display());
                continue;
            };
            match parse_identifier(identifier) {
                Ok(contract) => indexed.push((path, contract)),
                Err(e) => warn!("Skipping option file {}: {}", path.display(), e),
            }
        }

        Ok(indexed)
    }

    /// Read quotes for every indexed contract.
    ///
    /// Files are read in parallel; rows keep the file order so the result
    /// does not depend on scheduling. Unreadable files are logged and skipped.
    pub fn load_option_quotes(&self, contracts: &[(PathBuf, OptionContract)]) -> Vec<OptionQuote> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(contracts.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb.set_message("option files");
            pb
        } else {
            ProgressBar::hidden()
        };

        let per_file: Vec<Result<Vec<OptionQuote>, LoaderError>> = contracts
            .par_iter()
            .map(|(path, contract)| {
                let rows = self.read_price_file(path).map(|points| {
                    points
                        .into_iter()
                        .map(|p| OptionQuote {
                            contract: contract.identifier.clone(),
                            timestamp: p.timestamp,
                            close: p.close,
                        })
                        .collect()
                });
                pb.inc(1);
                rows
            })
            .collect();

        pb.finish_and_clear();

        let mut quotes = Vec::new();
        for ((path, _), rows) in contracts.iter().zip(per_file) {
            match rows {
                Ok(mut rows) => quotes.append(&mut rows),
                Err(e) => warn!("Error loading option file {}: {}", path.display(), e),
            }
        }
        quotes
    }

    /// Load the underlying series and option chain for a ticker.
    ///
    /// Fails when either side has no usable rows at all, since no trade
    /// could ever be produced.
    pub fn load_market(&self, ticker: &str) -> Result<MarketData, LoaderError> {
        let underlying = self.load_underlying(ticker)?;
        info!("Underlying rows: {}", underlying.len());

        let indexed = self.index_contracts(ticker)?;
        if indexed.is_empty() {
            return Err(LoaderError::NoOptionData(ticker.to_string()));
        }
        info!("Indexed {} option contracts", indexed.len());

        let quotes = self.load_option_quotes(&indexed);
        if quotes.is_empty() {
            return Err(LoaderError::NoOptionData(ticker.to_string()));
        }
        info!("Loaded {} rows of options data", quotes.len());

        let contracts = indexed.into_iter().map(|(_, c)| c).collect();
        Ok(MarketData::new(ticker, underlying, contracts, quotes))
    }
}

/// List `*.parquet` files in a directory, sorted by path.
/// A missing directory yields an empty list.
fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|x| x == "parquet").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Convert a frame with `ts` and `c` columns into price points.
fn frame_to_points(df: &DataFrame, utc_offset: Duration) -> Result<Vec<PricePoint>, LoaderError> {
    let ts_col = df.column(TS_COLUMN)?;
    let millis_per_unit = match ts_col.dtype() {
        DataType::Datetime(TimeUnit::Nanoseconds, _) => MillisScale::Divide(1_000_000),
        DataType::Datetime(TimeUnit::Microseconds, _) => MillisScale::Divide(1_000),
        DataType::Datetime(TimeUnit::Milliseconds, _) => MillisScale::Identity,
        dt if dt.is_integer() => MillisScale::Identity,
        other => {
            return Err(LoaderError::InvalidData(format!(
                "{} column has unexpected type {}",
                TS_COLUMN, other
            )))
        }
    };

    let ts_raw = ts_col.cast(&DataType::Int64)?;
    let close_raw = df.column(CLOSE_COLUMN)?.cast(&DataType::Float64)?;
    let ts_values = ts_raw.i64()?;
    let close_values = close_raw.f64()?;

    let mut points = Vec::with_capacity(df.height());
    for (ts, close) in ts_values.into_iter().zip(close_values.into_iter()) {
        let (Some(ts), Some(close)) = (ts, close) else {
            continue;
        };
        let Some(timestamp) = millis_to_local(millis_per_unit.apply(ts), utc_offset) else {
            continue;
        };
        let Some(close) = Decimal::from_f64(close) else {
            continue;
        };
        points.push(PricePoint { timestamp, close });
    }

    Ok(points)
}

#[derive(Debug, Clone, Copy)]
enum MillisScale {
    Identity,
    Divide(i64),
}

impl MillisScale {
    fn apply(self, value: i64) -> i64 {
        match self {
            Self::Identity => value,
            Self::Divide(d) => value.div_euclid(d),
        }
    }
}

/// Epoch milliseconds to naive local time.
fn millis_to_local(millis: i64, utc_offset: Duration) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc() + utc_offset)
}
