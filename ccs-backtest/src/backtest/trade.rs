//! Closed trade records.
//!
//! A trade is opened and closed on the same trading day, so there is no
//! open-position state: the strategy produces a finished `Trade` or a skip.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Spread reached the stop-loss level at the exit check.
    StopLoss,
    /// Closed at the first quote at or after the scheduled exit time.
    ScheduledExit,
    /// No quote after the scheduled exit time; closed at the day's last quote.
    MarketClose,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::ScheduledExit => "scheduled_exit",
            Self::MarketClose => "market_close",
        }
    }
}

/// A completed call credit spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Day the trade was opened and closed.
    pub trading_day: NaiveDate,
    pub ticker: String,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,

    /// Underlying price used for pricing at entry.
    pub spot_at_entry: Decimal,
    /// Strike of the call nearest the money.
    pub atm_strike: Decimal,
    /// Volatility implied by the ATM premium.
    pub implied_volatility: f64,

    /// Short leg.
    pub sell_contract: String,
    pub sell_strike: Decimal,
    pub sell_delta: f64,
    pub sell_price: Decimal,

    /// Long leg.
    pub buy_contract: String,
    pub buy_strike: Decimal,
    pub buy_price: Decimal,

    /// Net premium received per share.
    pub credit: Decimal,
    /// Spread level that triggers a stop-loss exit.
    pub stop_loss: Decimal,
    /// Spread value at exit.
    pub exit_spread: Decimal,
    /// Per-share P&L at exit.
    pub exit_pnl: Decimal,
    /// Position P&L after sizing and costs.
    pub total_pnl: Decimal,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Whether the trade made money after costs.
    pub fn is_winner(&self) -> bool {
        self.total_pnl > Decimal::ZERO
    }

    /// Whether the trade lost money after costs. Flat trades are neither.
    pub fn is_loser(&self) -> bool {
        self.total_pnl < Decimal::ZERO
    }

    /// Distance between the long and short strikes.
    pub fn strike_width(&self) -> Decimal {
        self.buy_strike - self.sell_strike
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn sample_trade(day: u32, total_pnl: Decimal) -> Trade {
        let trading_day = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        Trade {
            trading_day,
            ticker: "SPY".to_string(),
            entry_time: trading_day.and_hms_opt(9, 30, 0).unwrap(),
            exit_time: trading_day.and_hms_opt(14, 30, 0).unwrap(),
            spot_at_entry: dec!(560.12),
            atm_strike: dec!(560),
            implied_volatility: 0.18,
            sell_contract: "O:SPY250321C00565000".to_string(),
            sell_strike: dec!(565),
            sell_delta: 0.31,
            sell_price: dec!(1.10),
            buy_contract: "O:SPY250321C00570000".to_string(),
            buy_strike: dec!(570),
            buy_price: dec!(0.80),
            credit: dec!(0.30),
            stop_loss: dec!(0.33),
            exit_spread: dec!(0.20),
            exit_pnl: dec!(0.10),
            total_pnl,
            exit_reason: ExitReason::ScheduledExit,
        }
    }

    #[test]
    fn test_winner_and_width() {
        let trade = sample_trade(3, dec!(17.5));
        assert!(trade.is_winner());
        assert_eq!(trade.strike_width(), dec!(5));

        let flat = sample_trade(3, dec!(0));
        assert!(!flat.is_winner());
        assert!(!flat.is_loser());
        assert!(sample_trade(3, dec!(-8.5)).is_loser());
    }

    #[test]
    fn test_exit_reason_serialization() {
        let json = serde_json::to_string(&ExitReason::StopLoss).unwrap();
        assert_eq!(json, "\"StopLoss\"");
        assert_eq!(ExitReason::MarketClose.as_str(), "market_close");
    }
}
