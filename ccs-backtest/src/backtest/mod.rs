//! Backtesting engine for the call credit spread.
//!
//! This module provides:
//! - Per-day strategy evaluation (entry, leg selection, exit)
//! - Position sizing and trading costs
//! - The append-only trade ledger
//! - The daily simulation loop

pub mod commission;
pub mod engine;
pub mod ledger;
pub mod strategy;
pub mod trade;

pub use commission::{CommissionModel, TradeCost};
pub use engine::{BacktestEngine, BacktestResult};
pub use ledger::{LedgerError, LedgerReport, LedgerSummary, TradeLedger};
pub use strategy::{
    first_available, CallCreditSpreadStrategy, CandidateLeg, DayOutcome, ExitFill, SkipClass,
    SkipReason, StrategyConfig,
};
pub use trade::{ExitReason, Trade};
