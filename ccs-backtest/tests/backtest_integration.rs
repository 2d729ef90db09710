//! End-to-end run over parquet files in a temporary data directory.

use std::fs::{self, File};
use std::path::Path;

use approx::assert_relative_eq;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use ccs_backtest::backtest::{ExitReason, LedgerReport, SkipClass};
use ccs_backtest::data::LoaderError;
use ccs_backtest::{
    BacktestConfig, BacktestEngine, BlackScholes, DataLoader, MetricsCalculator,
};

/// Eastern standard time.
const UTC_OFFSET_MINUTES: i32 = -300;

fn utc_millis(date: NaiveDate, hour: u32, minute: u32) -> i64 {
    date.and_hms_opt(hour, minute, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

fn write_prices(path: &Path, rows: &[(i64, f64)]) {
    let ts: Vec<i64> = rows.iter().map(|(t, _)| *t).collect();
    let close: Vec<f64> = rows.iter().map(|(_, c)| *c).collect();
    let mut df = DataFrame::new(vec![
        Series::new("ts".into(), ts).into(),
        Series::new("o".into(), close.clone()).into(),
        Series::new("c".into(), close).into(),
    ])
    .unwrap();
    ParquetWriter::new(File::create(path).unwrap())
        .finish(&mut df)
        .unwrap();
}

fn trade_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Flat underlying for eight days, call chain priced at 20% vol on the
/// last day, and exit quotes at 14:30 Eastern for the expected legs.
fn build_data_dir(root: &Path) {
    let equity = root.join("equity/SPY");
    let options = root.join("options/SPY");
    fs::create_dir_all(&equity).unwrap();
    fs::create_dir_all(&options).unwrap();

    let first = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap();
    let days: Vec<NaiveDate> = first.iter_days().take(8).collect();
    assert_eq!(*days.last().unwrap(), trade_day());

    let (history, current): (Vec<NaiveDate>, Vec<NaiveDate>) =
        days.iter().copied().partition(|d| *d < trade_day());
    for (name, days) in [("part-0.parquet", history), ("part-1.parquet", current)] {
        let rows: Vec<(i64, f64)> = days
            .iter()
            .flat_map(|d| [(utc_millis(*d, 14, 30), 100.0), (utc_millis(*d, 21, 0), 100.0)])
            .collect();
        write_prices(&equity.join(name), &rows);
    }

    let bs = BlackScholes::default();
    let expiration = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
    let entry_local = trade_day().and_hms_opt(9, 30, 0).unwrap();
    let years = (expiration.and_time(NaiveTime::MIN) - entry_local).num_seconds() as f64
        / (365.25 * 86_400.0);

    let entry = utc_millis(trade_day(), 14, 30);
    let exit = utc_millis(trade_day(), 19, 30);

    for strike in 95..=115u32 {
        let identifier = format!("O:SPY250402C{:08}", strike * 1000);
        let premium = round_cents(bs.call_price(100.0, f64::from(strike), years, 0.2));

        let mut rows = vec![(entry, premium)];
        match strike {
            103 => rows.push((exit, 0.90)),
            108 => rows.push((exit, 0.50)),
            _ => {}
        }
        write_prices(&options.join(format!("{}.parquet", identifier)), &rows);
    }

    // Ignored by the strategy: a put, and a file whose name does not parse.
    write_prices(
        &options.join("O:SPY250402P00100000.parquet"),
        &[(entry, 2.2)],
    );
    write_prices(&options.join("not-a-contract.parquet"), &[(entry, 1.0)]);
}

fn config(root: &Path) -> BacktestConfig {
    BacktestConfig {
        data_dir: root.to_path_buf(),
        output_dir: root.join("output"),
        utc_offset_minutes: UTC_OFFSET_MINUTES,
        ..Default::default()
    }
}

fn loader(config: &BacktestConfig) -> DataLoader {
    DataLoader::new(&config.data_dir).with_utc_offset_minutes(config.utc_offset_minutes)
}

fn local(hour: u32, minute: u32) -> NaiveDateTime {
    trade_day().and_hms_opt(hour, minute, 0).unwrap()
}

#[test]
fn test_loader_reads_partitioned_files() {
    let dir = tempfile::tempdir().unwrap();
    build_data_dir(dir.path());
    let config = config(dir.path());

    let market = loader(&config).load_market("SPY").unwrap();
    assert_eq!(market.underlying().len(), 16);
    assert_eq!(market.trading_days().len(), 8);
    // 21 calls and one put; the malformed file is skipped.
    assert_eq!(market.contracts().len(), 22);
    assert_eq!(market.quote_count(), 24);

    let quotes = market.quotes_on(trade_day()).unwrap();
    assert_eq!(quotes.first_timestamp(), Some(local(9, 30)));
    assert_eq!(quotes.last_timestamp(), Some(local(14, 30)));
    assert_eq!(market.spot_near(local(9, 31)), Some(dec!(100)));
}

#[test]
fn test_backtest_produces_one_spread() {
    let dir = tempfile::tempdir().unwrap();
    build_data_dir(dir.path());
    let config = config(dir.path());

    let result = BacktestEngine::new(config.clone())
        .run(&loader(&config))
        .unwrap();

    assert_eq!(result.ticker, "SPY");
    assert_eq!(result.days_evaluated, 8);
    assert_eq!(result.ledger.len(), 1);
    assert_eq!(result.skip_counts.get("insufficient_history"), Some(&6));
    assert_eq!(result.skip_counts.get("no_option_quotes"), Some(&1));
    assert_eq!(result.skip_class_counts.get(&SkipClass::MissingData), Some(&7));

    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.trading_day, trade_day());
    assert_eq!(trade.entry_time, local(9, 30));
    assert_eq!(trade.exit_time, local(14, 30));
    assert_eq!(trade.atm_strike, dec!(100));
    assert_relative_eq!(trade.implied_volatility, 0.2, epsilon = 0.005);

    assert_eq!(trade.sell_strike, dec!(103));
    assert_eq!(trade.buy_strike, dec!(108));
    assert!(trade.sell_delta < 0.35);
    assert!(trade.buy_strike - trade.sell_strike >= dec!(5));
    assert!(trade.credit > dec!(0.25));
    assert_eq!(trade.stop_loss, trade.credit + dec!(0.03));

    assert_eq!(trade.exit_reason, ExitReason::ScheduledExit);
    assert_eq!(trade.exit_pnl, trade.credit - trade.exit_spread);
    assert_eq!(trade.total_pnl, trade.exit_pnl * dec!(200) - dec!(2.5));
    assert_relative_eq!(trade.credit.to_f64().unwrap(), 0.88, epsilon = 1e-9);
    assert_relative_eq!(trade.total_pnl.to_f64().unwrap(), 93.5, epsilon = 1e-9);

    let metrics = MetricsCalculator::calculate(&result.ledger);
    assert_eq!(metrics.total_trades, 1);
    assert_eq!(metrics.win_rate, 1.0);
    assert_eq!(metrics.total_pnl, trade.total_pnl);
}

#[test]
fn test_rerun_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    build_data_dir(dir.path());
    let config = config(dir.path());
    fs::create_dir_all(&config.output_dir).unwrap();

    let engine = BacktestEngine::new(config.clone());
    let first = config.output_dir.join("first.json");
    let second = config.output_dir.join("second.json");
    engine.run(&loader(&config)).unwrap().ledger.write_json(&first).unwrap();
    engine.run(&loader(&config)).unwrap().ledger.write_json(&second).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

    let report: LedgerReport = serde_json::from_reader(File::open(&first).unwrap()).unwrap();
    assert_eq!(report.sell_strikes, vec![dec!(103)]);
    assert_eq!(report.buy_strikes, vec![dec!(108)]);
    assert_eq!(report.summary.total_trades, 1);
}

#[test]
fn test_uptrend_window_skips_every_day() {
    let dir = tempfile::tempdir().unwrap();
    build_data_dir(dir.path());
    let mut config = config(dir.path());
    // Below zero, even a flat moving average reads as an uptrend.
    config.strategy.max_ma_change_pct = -0.5;

    let result = BacktestEngine::new(config.clone())
        .run(&loader(&config))
        .unwrap();
    assert!(result.ledger.is_empty());
    assert_eq!(result.skip_counts.get("uptrend"), Some(&2));
    assert_eq!(result.skip_counts.get("no_option_quotes"), None);
}

#[test]
fn test_missing_options_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let equity = dir.path().join("equity/SPY");
    fs::create_dir_all(&equity).unwrap();
    write_prices(
        &equity.join("2025-03.parquet"),
        &[(utc_millis(trade_day(), 14, 30), 100.0)],
    );

    let err = DataLoader::new(dir.path()).load_market("SPY").unwrap_err();
    assert!(matches!(err, LoaderError::NoOptionData(_)));

    let err = DataLoader::new(dir.path()).load_market("QQQ").unwrap_err();
    assert!(matches!(err, LoaderError::NoEquityData(_)));
}
