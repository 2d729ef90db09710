//! Append-only trade ledger and its JSON report.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::trade::Trade;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Trade already recorded for {0}")]
    DuplicateDay(NaiveDate),

    #[error("Trade for {day} recorded after {last}")]
    OutOfOrder { day: NaiveDate, last: NaiveDate },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered record of closed trades, at most one per trading day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeLedger {
    trades: Vec<Trade>,
}

/// Aggregate block of the exported report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_trades: usize,
    pub total_pnl: Decimal,
    pub win_rate: f64,
}

/// Exported report: per-field columns for charting plus full trade rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReport {
    pub entry_times: Vec<NaiveDateTime>,
    pub exit_times: Vec<NaiveDateTime>,
    pub sell_strikes: Vec<Decimal>,
    pub buy_strikes: Vec<Decimal>,
    pub trades: Vec<Trade>,
    pub summary: LedgerSummary,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trade. Trades must arrive in trading-day order.
    pub fn record(&mut self, trade: Trade) -> Result<(), LedgerError> {
        if let Some(last) = self.trades.last().map(|t| t.trading_day) {
            if trade.trading_day == last {
                return Err(LedgerError::DuplicateDay(last));
            }
            if trade.trading_day < last {
                return Err(LedgerError::OutOfOrder {
                    day: trade.trading_day,
                    last,
                });
            }
        }
        self.trades.push(trade);
        Ok(())
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Sum of trade P&L after costs.
    pub fn total_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.total_pnl).sum()
    }

    /// Fraction of trades with positive P&L; 0 when empty.
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let winners = self.trades.iter().filter(|t| t.is_winner()).count();
        winners as f64 / self.trades.len() as f64
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            total_trades: self.len(),
            total_pnl: self.total_pnl(),
            win_rate: self.win_rate(),
        }
    }

    pub fn report(&self) -> LedgerReport {
        LedgerReport {
            entry_times: self.trades.iter().map(|t| t.entry_time).collect(),
            exit_times: self.trades.iter().map(|t| t.exit_time).collect(),
            sell_strikes: self.trades.iter().map(|t| t.sell_strike).collect(),
            buy_strikes: self.trades.iter().map(|t| t.buy_strike).collect(),
            trades: self.trades.clone(),
            summary: self.summary(),
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), LedgerError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.report())?;
        writer.flush()?;
        Ok(())
    }
}
