//! Core backtesting engine.
//!
//! Runs the simulation loop:
//! 1. Load the underlying series and option chain
//! 2. Build daily moving-average summaries over the full history
//! 3. Evaluate each trading day in the window against the previous summary
//! 4. Record closed trades in the ledger and count skipped days by reason

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BacktestConfig;
use crate::data::{DataLoader, LoaderError, MarketData};
use crate::trend::{daily_summaries, DailySummary};

use super::ledger::TradeLedger;
use super::strategy::{CallCreditSpreadStrategy, DayOutcome, SkipClass, SkipReason};

/// Result of a completed backtest.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub ticker: String,

    /// First and last trading day evaluated.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,

    /// Trading days handed to the strategy.
    pub days_evaluated: usize,

    /// Skipped days per reason label.
    pub skip_counts: BTreeMap<String, usize>,

    /// Skipped days per coarse class.
    pub skip_class_counts: BTreeMap<SkipClass, usize>,

    pub ledger: TradeLedger,
}

impl BacktestResult {
    /// Total skipped days.
    pub fn days_skipped(&self) -> usize {
        self.skip_counts.values().sum()
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    strategy: CallCreditSpreadStrategy,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        let strategy =
            CallCreditSpreadStrategy::new(config.strategy.clone(), config.commission.clone());
        Self { config, strategy }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Load the configured ticker and run the backtest on it.
    pub fn run(&self, loader: &DataLoader) -> Result<BacktestResult, LoaderError> {
        let market = loader.load_market(&self.config.ticker)?;
        Ok(self.run_with_data(&market))
    }

    /// Run on pre-loaded data.
    pub fn run_with_data(&self, market: &MarketData) -> BacktestResult {
        match market.time_range() {
            Some((first, last)) => info!(
                "{} data: {} to {}, {} bars, {} contracts, {} option quotes on {} days",
                market.ticker(),
                first,
                last,
                market.underlying().len(),
                market.contracts().len(),
                market.quote_count(),
                market.quote_days()
            ),
            None => warn!("{} data: no underlying bars", market.ticker()),
        }
        for rule in self.config.strategy.describe() {
            info!("{}", rule);
        }

        let summaries = daily_summaries(market.underlying(), self.config.strategy.ma_window);

        let mut ledger = TradeLedger::new();
        let mut skip_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut skip_class_counts: BTreeMap<SkipClass, usize> = BTreeMap::new();
        let mut days_evaluated = 0;
        let mut start = None;
        let mut end = None;
        let mut previous: Option<DailySummary> = None;

        for summary in summaries {
            let day = summary.date;
            if self.in_window(day) {
                days_evaluated += 1;
                start.get_or_insert(day);
                end = Some(day);

                let outcome = match previous {
                    Some(prev) => self.strategy.evaluate_day(market, day, prev),
                    None => DayOutcome::Skipped(SkipReason::InsufficientHistory),
                };

                match outcome {
                    DayOutcome::Closed(trade) => {
                        info!(
                            "{}: sold {} / bought {} for {} credit, exit {} at {} ({}), P&L {}",
                            day,
                            trade.sell_strike,
                            trade.buy_strike,
                            trade.credit,
                            trade.exit_spread,
                            trade.exit_time.time(),
                            trade.exit_reason.as_str(),
                            trade.total_pnl
                        );
                        if let Err(e) = ledger.record(trade) {
                            warn!("Dropping trade for {}: {}", day, e);
                        }
                    }
                    DayOutcome::Skipped(reason) => {
                        let class = reason.class();
                        info!("Skipping {} ({}): {}", day, class.as_str(), reason);
                        *skip_counts.entry(reason.label().to_string()).or_default() += 1;
                        *skip_class_counts.entry(class).or_default() += 1;
                    }
                }
            }
            previous = Some(summary);
        }

        info!(
            "Backtest complete: {} days, {} trades, {} skipped, total P&L {}, win rate {:.1}%",
            days_evaluated,
            ledger.len(),
            skip_counts.values().sum::<usize>(),
            ledger.total_pnl(),
            ledger.win_rate() * 100.0
        );

        BacktestResult {
            ticker: market.ticker().to_string(),
            start,
            end,
            days_evaluated,
            skip_counts,
            skip_class_counts,
            ledger,
        }
    }

    fn in_window(&self, day: NaiveDate) -> bool {
        self.config.start_date.map_or(true, |s| day >= s)
            && self.config.end_date.map_or(true, |e| day <= e)
    }
}
