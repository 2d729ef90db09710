//! Call credit spread strategy.
//!
//! Evaluates one trading day at a time:
//! 1. Trend filter on the previous day's moving-average change
//! 2. Entry at the first option quote of the day
//! 3. ATM call anchors the implied volatility
//! 4. Short call chosen by delta, long call by strike distance
//! 5. Exit at the first quote after the scheduled exit time, with a
//!    stop-loss check, or at the last quote of the day
//!
//! A day either closes exactly one trade or is skipped with a reason.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::{DayQuotes, MarketData, OptionContract};
use crate::pricing::{BlackScholes, PricingError, VolBracket};
use crate::trend::{DailySummary, TrendState};

use super::commission::CommissionModel;
use super::trade::{ExitReason, Trade};

/// Strategy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Name used for log and report file names.
    pub name: String,

    /// Risk-free rate for Black-Scholes.
    pub risk_free_rate: f64,

    /// Calendar days per year for time to expiry.
    pub days_per_year: f64,

    /// Daily closes in the trend moving average.
    pub ma_window: usize,

    /// Skip the day when the previous MA change exceeds this (percent).
    pub max_ma_change_pct: f64,

    /// Search interval for implied volatility.
    pub iv_bracket: VolBracket,

    /// Skip the day when the ATM implied volatility exceeds this.
    pub max_iv: f64,

    /// Short call delta must be strictly below this.
    pub max_sell_delta: f64,

    /// Minimum distance between the long and short strikes.
    pub min_strike_width: Decimal,

    /// Credit must be strictly above this.
    pub min_credit: Decimal,

    /// Stop-loss level is `credit + stop_loss_buffer`.
    pub stop_loss_buffer: Decimal,

    /// Local time from which the position is closed.
    pub exit_time: NaiveTime,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "call_credit_spread".to_string(),
            risk_free_rate: 0.01,
            days_per_year: 365.25,
            ma_window: 5,
            max_ma_change_pct: 1.0,
            iv_bracket: VolBracket::default(),
            max_iv: 0.75,
            max_sell_delta: 0.35,
            min_strike_width: Decimal::from(5),
            min_credit: Decimal::new(25, 2),
            stop_loss_buffer: Decimal::new(3, 2),
            exit_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl StrategyConfig {
    /// Entry and exit rules, one line each, for the run log.
    pub fn describe(&self) -> Vec<String> {
        vec![
            format!(
                "Trend: skip when the previous {}-day MA change exceeds {:.2}%",
                self.ma_window, self.max_ma_change_pct
            ),
            format!(
                "Volatility: ATM IV solved on [{}, {}] at rate {}, skip above {:.2}",
                self.iv_bracket.lower, self.iv_bracket.upper, self.risk_free_rate, self.max_iv
            ),
            format!(
                "Legs: sell the highest delta below {:.2}, buy at least {} strikes higher",
                self.max_sell_delta, self.min_strike_width
            ),
            format!(
                "Credit: must exceed {}, stop loss at credit + {}",
                self.min_credit, self.stop_loss_buffer
            ),
            format!(
                "Exit: first quote from {} with both legs priced, else the last quote",
                self.exit_time
            ),
        ]
    }
}

/// Coarse grouping of skip reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SkipClass {
    /// Required prices or quotes are absent.
    MissingData,
    /// A pricing computation failed.
    NumericFailure,
    /// A strategy rule rejected the day.
    Filter,
}

impl SkipClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingData => "missing_data",
            Self::NumericFailure => "numeric_failure",
            Self::Filter => "filter",
        }
    }
}

/// Why a trading day produced no trade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("no previous moving-average change")]
    InsufficientHistory,

    #[error("uptrend, MA change {ma_change_pct:.2}%")]
    Uptrend { ma_change_pct: f64 },

    #[error("no option quotes")]
    NoOptionQuotes,

    #[error("no underlying price near entry")]
    NoUnderlying,

    #[error("invalid spot price {0}")]
    InvalidSpot(Decimal),

    #[error("no priced ATM call")]
    NoAtmContract,

    #[error("implied volatility failed: {0}")]
    ImpliedVolFailed(PricingError),

    #[error("implied volatility {iv:.4} out of range")]
    IvOutOfRange { iv: f64 },

    #[error("no priced call below the delta limit")]
    NoSellLeg,

    #[error("no priced call at least {width} above strike {sell_strike}")]
    NoBuyLeg { sell_strike: Decimal, width: Decimal },

    #[error("credit {credit} too small")]
    InsufficientCredit { credit: Decimal },

    #[error("no exit quote for both legs")]
    NoExitQuote,
}

impl SkipReason {
    /// Stable key for counting skips.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsufficientHistory => "insufficient_history",
            Self::Uptrend { .. } => "uptrend",
            Self::NoOptionQuotes => "no_option_quotes",
            Self::NoUnderlying => "no_underlying",
            Self::InvalidSpot(_) => "invalid_spot",
            Self::NoAtmContract => "no_atm_contract",
            Self::ImpliedVolFailed(_) => "implied_vol_failed",
            Self::IvOutOfRange { .. } => "iv_out_of_range",
            Self::NoSellLeg => "no_sell_leg",
            Self::NoBuyLeg { .. } => "no_buy_leg",
            Self::InsufficientCredit { .. } => "insufficient_credit",
            Self::NoExitQuote => "no_exit_quote",
        }
    }

    pub fn class(&self) -> SkipClass {
        match self {
            Self::InsufficientHistory
            | Self::NoOptionQuotes
            | Self::NoUnderlying
            | Self::InvalidSpot(_)
            | Self::NoAtmContract
            | Self::NoExitQuote => SkipClass::MissingData,
            Self::ImpliedVolFailed(_) => SkipClass::NumericFailure,
            Self::Uptrend { .. }
            | Self::IvOutOfRange { .. }
            | Self::NoSellLeg
            | Self::NoBuyLeg { .. }
            | Self::InsufficientCredit { .. } => SkipClass::Filter,
        }
    }
}

/// Result of evaluating one trading day.
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    Skipped(SkipReason),
    Closed(Trade),
}

/// A contract chosen for one leg, with its entry price.
#[derive(Debug, Clone, Copy)]
pub struct CandidateLeg<'a> {
    pub contract: &'a OptionContract,
    pub delta: Option<f64>,
    pub price: Decimal,
}

/// Exit of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitFill {
    pub time: NaiveDateTime,
    /// Short minus long price at exit.
    pub spread: Decimal,
    /// Per-share P&L.
    pub pnl: Decimal,
    pub reason: ExitReason,
}

/// First candidate, in iteration order, for which `lookup` yields a value.
pub fn first_available<T, U, I, F>(candidates: I, mut lookup: F) -> Option<(T, U)>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Option<U>,
{
    candidates
        .into_iter()
        .find_map(|candidate| lookup(&candidate).map(|value| (candidate, value)))
}

/// Call credit spread evaluator.
pub struct CallCreditSpreadStrategy {
    config: StrategyConfig,
    commission: CommissionModel,
    pricer: BlackScholes,
}

impl CallCreditSpreadStrategy {
    pub fn new(config: StrategyConfig, commission: CommissionModel) -> Self {
        let pricer = BlackScholes::new(config.risk_free_rate).with_bracket(config.iv_bracket);
        Self {
            config,
            commission,
            pricer,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Evaluate `day` given the previous trading day's summary.
    pub fn evaluate_day(
        &self,
        market: &MarketData,
        day: NaiveDate,
        previous: DailySummary,
    ) -> DayOutcome {
        match self.try_trade(market, day, previous) {
            Ok(trade) => DayOutcome::Closed(trade),
            Err(reason) => DayOutcome::Skipped(reason),
        }
    }

    fn try_trade(
        &self,
        market: &MarketData,
        day: NaiveDate,
        previous: DailySummary,
    ) -> Result<Trade, SkipReason> {
        match previous.trend(self.config.max_ma_change_pct) {
            TrendState::Unknown => return Err(SkipReason::InsufficientHistory),
            TrendState::Uptrend => {
                return Err(SkipReason::Uptrend {
                    ma_change_pct: previous.ma_change_pct.unwrap_or_default(),
                })
            }
            TrendState::Neutral => {}
        }

        let quotes = market.quotes_on(day).ok_or(SkipReason::NoOptionQuotes)?;
        let entry = quotes.first_timestamp().ok_or(SkipReason::NoOptionQuotes)?;

        let spot = market.spot_near(entry).ok_or(SkipReason::NoUnderlying)?;
        let spot_f = spot
            .to_f64()
            .filter(|s| *s > 0.0)
            .ok_or(SkipReason::InvalidSpot(spot))?;

        let mut calls: Vec<&OptionContract> = market.active_calls(day).collect();

        calls.sort_by_key(|c| ((c.strike - spot).abs(), c.expiration, c.strike));
        let (atm, atm_price) = first_available(calls.iter().copied(), |c| {
            quotes.price(entry, &c.identifier)
        })
        .ok_or(SkipReason::NoAtmContract)?;

        let iv = self
            .implied_volatility(atm, entry, spot_f, atm_price)
            .map_err(SkipReason::ImpliedVolFailed)?;
        if iv <= 0.0 || iv > self.config.max_iv {
            return Err(SkipReason::IvOutOfRange { iv });
        }
        debug!(
            "{}: entry {} spot {} ATM {} premium {} IV {:.4}",
            day, entry, spot, atm.identifier, atm_price, iv
        );

        let deltas: Vec<(&OptionContract, f64)> = calls
            .iter()
            .filter_map(|c| match self.delta(c, entry, spot_f, iv) {
                Ok(delta) => Some((*c, delta)),
                Err(e) => {
                    debug!("{}: no delta for {}: {}", day, c.identifier, e);
                    None
                }
            })
            .collect();

        let sell = select_sell_leg(&deltas, self.config.max_sell_delta, |c| {
            quotes.price(entry, &c.identifier)
        })
        .ok_or(SkipReason::NoSellLeg)?;

        let buy = select_buy_leg(
            &calls,
            sell.contract.strike + self.config.min_strike_width,
            |c| quotes.price(entry, &c.identifier),
        )
        .ok_or(SkipReason::NoBuyLeg {
            sell_strike: sell.contract.strike,
            width: self.config.min_strike_width,
        })?;

        let credit = sell.price - buy.price;
        if credit <= self.config.min_credit {
            return Err(SkipReason::InsufficientCredit { credit });
        }

        let stop_loss = credit + self.config.stop_loss_buffer;
        let fill = simulate_exit(
            quotes,
            entry,
            &sell.contract.identifier,
            &buy.contract.identifier,
            credit,
            stop_loss,
            self.config.exit_time,
        )
        .ok_or(SkipReason::NoExitQuote)?;

        Ok(Trade {
            trading_day: day,
            ticker: market.ticker().to_string(),
            entry_time: entry,
            exit_time: fill.time,
            spot_at_entry: spot,
            atm_strike: atm.strike,
            implied_volatility: iv,
            sell_contract: sell.contract.identifier.clone(),
            sell_strike: sell.contract.strike,
            sell_delta: sell.delta.unwrap_or_default(),
            sell_price: sell.price,
            buy_contract: buy.contract.identifier.clone(),
            buy_strike: buy.contract.strike,
            buy_price: buy.price,
            credit,
            stop_loss,
            exit_spread: fill.spread,
            exit_pnl: fill.pnl,
            total_pnl: self.commission.net_pnl(fill.pnl),
            exit_reason: fill.reason,
        })
    }

    fn implied_volatility(
        &self,
        contract: &OptionContract,
        at: NaiveDateTime,
        spot: f64,
        premium: Decimal,
    ) -> Result<f64, PricingError> {
        let strike = contract
            .strike
            .to_f64()
            .ok_or(PricingError::InvalidInput("strike is not representable"))?;
        let premium = premium
            .to_f64()
            .ok_or(PricingError::InvalidInput("premium is not representable"))?;
        let time = contract.years_to_expiry(at, self.config.days_per_year);
        self.pricer.implied_volatility(spot, strike, time, premium)
    }

    fn delta(
        &self,
        contract: &OptionContract,
        at: NaiveDateTime,
        spot: f64,
        vol: f64,
    ) -> Result<f64, PricingError> {
        let strike = contract
            .strike
            .to_f64()
            .ok_or(PricingError::InvalidInput("strike is not representable"))?;
        let time = contract.years_to_expiry(at, self.config.days_per_year);
        self.pricer.delta(spot, strike, time, vol)
    }
}

/// Highest-delta priced call with delta strictly below `max_delta`.
pub fn select_sell_leg<'a, F>(
    deltas: &[(&'a OptionContract, f64)],
    max_delta: f64,
    mut price: F,
) -> Option<CandidateLeg<'a>>
where
    F: FnMut(&OptionContract) -> Option<Decimal>,
{
    let mut eligible: Vec<(&OptionContract, f64)> = deltas
        .iter()
        .copied()
        .filter(|(_, delta)| *delta < max_delta)
        .collect();
    eligible.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.expiration.cmp(&b.0.expiration))
    });

    first_available(eligible, |(c, _)| price(c)).map(|((contract, delta), price)| {
        CandidateLeg {
            contract,
            delta: Some(delta),
            price,
        }
    })
}

/// Lowest-strike priced call with strike at or above `min_strike`.
/// Nearer expirations win ties.
pub fn select_buy_leg<'a, F>(
    calls: &[&'a OptionContract],
    min_strike: Decimal,
    mut price: F,
) -> Option<CandidateLeg<'a>>
where
    F: FnMut(&OptionContract) -> Option<Decimal>,
{
    let mut eligible: Vec<&OptionContract> = calls
        .iter()
        .copied()
        .filter(|c| c.strike >= min_strike)
        .collect();
    eligible.sort_by_key(|c| (c.strike, c.expiration));

    first_available(eligible, |c| price(c)).map(|(contract, price)| CandidateLeg {
        contract,
        delta: None,
        price,
    })
}

/// Close the spread opened at `entry`.
///
/// The first timestamp at or after `exit_time` where both legs are priced
/// ends the scan. Without one, the position is closed at the day's last
/// quote; `None` when either leg is unpriced there too.
pub fn simulate_exit(
    quotes: &DayQuotes,
    entry: NaiveDateTime,
    sell: &str,
    buy: &str,
    credit: Decimal,
    stop_loss: Decimal,
    exit_time: NaiveTime,
) -> Option<ExitFill> {
    for ts in quotes.timestamps_after(entry) {
        if ts.time() < exit_time {
            continue;
        }
        let (Some(sell_price), Some(buy_price)) = (quotes.price(ts, sell), quotes.price(ts, buy))
        else {
            continue;
        };

        let spread = sell_price - buy_price;
        return Some(if spread >= stop_loss {
            ExitFill {
                time: ts,
                spread,
                pnl: credit - stop_loss,
                reason: ExitReason::StopLoss,
            }
        } else {
            ExitFill {
                time: ts,
                spread,
                pnl: credit - spread,
                reason: ExitReason::ScheduledExit,
            }
        });
    }

    let last = quotes.last_timestamp()?;
    let spread = quotes.price(last, sell)? - quotes.price(last, buy)?;
    Some(ExitFill {
        time: last,
        spread,
        pnl: credit - spread,
        reason: ExitReason::MarketClose,
    })
}
