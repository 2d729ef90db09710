//! Daily trend state of the underlying.
//!
//! Collapses the intraday underlying series into one summary per day:
//! - last close of the day
//! - N-day simple moving average of those closes
//! - day-over-day percent change of the moving average
//!
//! The strategy reads the previous day's summary to decide whether the
//! market is trending up too fast to sell calls.

pub mod summary;

pub use summary::{daily_summaries, DailySummary, TrendState};
