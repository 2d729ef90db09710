//! Performance metrics calculator.
//!
//! Calculates trading performance statistics from closed trades.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{ExitReason, Trade, TradeLedger};

/// Performance metrics for a ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Basic statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,

    // P&L metrics
    pub total_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64,
    pub avg_trade_pnl: Decimal,
    pub avg_winner: Decimal,
    pub avg_loser: Decimal,
    pub largest_winner: Decimal,
    pub largest_loser: Decimal,
    pub avg_credit: Decimal,

    // Risk metrics
    pub max_drawdown: Decimal,
    pub drawdown_duration_days: i64,

    // Exits
    pub stop_loss_exits: usize,
    pub scheduled_exits: usize,
    pub market_close_exits: usize,

    pub monthly: Vec<MonthlyPnl>,
}

impl PerformanceMetrics {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let mut report = format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Trades: {} (W: {}, L: {}, flat: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {:.2}\n\
             \n\
             Total P&L: ${:.2}\n\
             Gross Profit: ${:.2}\n\
             Gross Loss: ${:.2}\n\
             Avg Trade: ${:.2}\n\
             Avg Winner: ${:.2}\n\
             Avg Loser: ${:.2}\n\
             Largest Win: ${:.2}\n\
             Largest Loss: ${:.2}\n\
             Avg Credit: {:.2}\n\
             \n\
             Max Drawdown: ${:.2} ({} days)\n\
             \n\
             Exits: {} stop-loss, {} scheduled, {} market close",
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.breakeven_trades,
            self.win_rate * 100.0,
            self.profit_factor,
            self.total_pnl,
            self.gross_profit,
            self.gross_loss,
            self.avg_trade_pnl,
            self.avg_winner,
            self.avg_loser,
            self.largest_winner,
            self.largest_loser,
            self.avg_credit,
            self.max_drawdown,
            self.drawdown_duration_days,
            self.stop_loss_exits,
            self.scheduled_exits,
            self.market_close_exits,
        );

        if !self.monthly.is_empty() {
            report.push_str("\n\nMonthly P&L\n-----------");
            for month in &self.monthly {
                report.push_str(&format!(
                    "\n{}-{:02}: ${:.2} ({} trades, {:.1}% win)",
                    month.year,
                    month.month,
                    month.pnl,
                    month.trades,
                    month.win_rate * 100.0
                ));
            }
        }

        report
    }
}

/// Drawdown of the cumulative P&L curve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown: Decimal,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// Days from the peak to the deepest trough.
    pub duration_days: i64,
    pub drawdown_periods: usize,
}

/// P&L of trades closed in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPnl {
    pub year: i32,
    pub month: u32,
    pub pnl: Decimal,
    pub trades: usize,
    pub win_rate: f64,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from a ledger.
    pub fn calculate(ledger: &TradeLedger) -> PerformanceMetrics {
        let trades = ledger.trades();

        // Basic counts
        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();
        let losing_trades = trades.iter().filter(|t| t.is_loser()).count();
        let breakeven_trades = total_trades - winning_trades - losing_trades;

        // P&L calculations
        let total_pnl = ledger.total_pnl();
        let gross_profit: Decimal = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.total_pnl)
            .sum();
        let gross_loss: Decimal = trades
            .iter()
            .filter(|t| t.is_loser())
            .map(|t| t.total_pnl)
            .sum();

        let largest_winner = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.total_pnl)
            .max()
            .unwrap_or(Decimal::ZERO);

        let largest_loser = trades
            .iter()
            .filter(|t| t.is_loser())
            .map(|t| t.total_pnl)
            .min()
            .unwrap_or(Decimal::ZERO);

        let drawdown = Self::analyze_drawdown(trades);

        PerformanceMetrics {
            total_trades,
            winning_trades,
            losing_trades,
            breakeven_trades,
            win_rate: ledger.win_rate(),
            total_pnl,
            gross_profit,
            gross_loss,
            profit_factor: Self::calculate_profit_factor(gross_profit, gross_loss),
            avg_trade_pnl: average(total_pnl, total_trades),
            avg_winner: average(gross_profit, winning_trades),
            avg_loser: average(gross_loss, losing_trades),
            largest_winner,
            largest_loser,
            avg_credit: average(trades.iter().map(|t| t.credit).sum(), total_trades),
            max_drawdown: drawdown.max_drawdown,
            drawdown_duration_days: drawdown.duration_days,
            stop_loss_exits: Self::count_exits(trades, ExitReason::StopLoss),
            scheduled_exits: Self::count_exits(trades, ExitReason::ScheduledExit),
            market_close_exits: Self::count_exits(trades, ExitReason::MarketClose),
            monthly: Self::monthly_pnl(trades),
        }
    }

    /// Gross profit over absolute gross loss; infinite without losses.
    fn calculate_profit_factor(gross_profit: Decimal, gross_loss: Decimal) -> f64 {
        let loss = gross_loss.abs().to_f64().unwrap_or(0.0);
        if loss == 0.0 {
            return f64::INFINITY;
        }
        let profit = gross_profit.to_f64().unwrap_or(0.0);
        profit / loss
    }

    /// Analyze drawdown of cumulative P&L, starting from a flat account.
    pub fn analyze_drawdown(trades: &[Trade]) -> DrawdownAnalysis {
        let mut analysis = DrawdownAnalysis::default();

        let mut cumulative = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut peak_date: Option<NaiveDate> = None;
        let mut in_drawdown = false;

        for trade in trades {
            cumulative += trade.total_pnl;

            if cumulative >= peak {
                if in_drawdown && cumulative > peak {
                    analysis.drawdown_periods += 1;
                    in_drawdown = false;
                }
                peak = cumulative;
                peak_date = Some(trade.trading_day);
                continue;
            }

            in_drawdown = true;
            let drawdown = peak - cumulative;
            if drawdown > analysis.max_drawdown {
                analysis.max_drawdown = drawdown;
                analysis.peak_date = peak_date;
                analysis.trough_date = Some(trade.trading_day);
                analysis.duration_days = peak_date
                    .map(|p| (trade.trading_day - p).num_days())
                    .unwrap_or(0);
            }
        }

        if in_drawdown {
            analysis.drawdown_periods += 1;
        }

        analysis
    }

    fn count_exits(trades: &[Trade], reason: ExitReason) -> usize {
        trades.iter().filter(|t| t.exit_reason == reason).count()
    }

    /// P&L grouped by calendar month of the trading day, in order.
    pub fn monthly_pnl(trades: &[Trade]) -> Vec<MonthlyPnl> {
        let mut monthly: BTreeMap<(i32, u32), Vec<&Trade>> = BTreeMap::new();

        for trade in trades {
            let key = (trade.trading_day.year(), trade.trading_day.month());
            monthly.entry(key).or_default().push(trade);
        }

        monthly
            .into_iter()
            .map(|((year, month), trades)| {
                let winners = trades.iter().filter(|t| t.is_winner()).count();
                MonthlyPnl {
                    year,
                    month,
                    pnl: trades.iter().map(|t| t.total_pnl).sum(),
                    trades: trades.len(),
                    win_rate: winners as f64 / trades.len() as f64,
                }
            })
            .collect()
    }
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    total / Decimal::from(count as u64)
}
