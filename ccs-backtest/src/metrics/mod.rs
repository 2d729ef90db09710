//! Performance metrics module.
//!
//! Derived statistics on a trade ledger:
//! - Win rate, profit factor
//! - Average and extreme trades
//! - Maximum drawdown of cumulative P&L
//! - Exit reason counts, monthly P&L

pub mod calculator;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, MonthlyPnl, PerformanceMetrics};
