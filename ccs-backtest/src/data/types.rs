//! Core data types for the backtester.
//!
//! Prices and strikes are carried as `Decimal` so that credit and P&L
//! arithmetic is exact. Timestamps are naive local times produced by the
//! loader after applying the configured UTC offset.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Seconds in a day, used for year fractions.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

/// A single close observation for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: NaiveDateTime,
    pub close: Decimal,
}

impl PricePoint {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// An option contract, derived from its identifier at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionContract {
    /// Identifier as found in the data files (e.g. "O:SPY250321C00560000").
    pub identifier: String,

    /// Underlying root symbol (e.g. "SPY").
    pub root: String,

    /// Expiration date.
    pub expiration: NaiveDate,

    /// Call or put.
    pub option_type: OptionType,

    /// Strike price.
    pub strike: Decimal,
}

impl OptionContract {
    pub fn is_call(&self) -> bool {
        self.option_type == OptionType::Call
    }

    /// A contract is active on `date` when it expires strictly after it.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.expiration > date
    }

    /// Time to expiry in years, measured from `at` to midnight of the
    /// expiration date.
    pub fn years_to_expiry(&self, at: NaiveDateTime, days_per_year: f64) -> f64 {
        let expiry = self.expiration.and_time(NaiveTime::MIN);
        (expiry - at).num_seconds() as f64 / (days_per_year * SECONDS_PER_DAY)
    }
}

/// A close price observed for one contract at one timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Identifier of the quoted contract.
    pub contract: String,
    pub timestamp: NaiveDateTime,
    pub close: Decimal,
}
