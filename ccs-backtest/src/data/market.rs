//! In-memory market tables for one underlying and its option chain.
//!
//! Built once from loaded rows and read-only afterwards. Option quotes are
//! indexed by trading day, then by timestamp, then by contract identifier,
//! which is the access pattern of the per-day strategy evaluation.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use super::types::{OptionContract, OptionQuote, PricePoint};

/// All option quotes observed on a single trading day.
#[derive(Debug, Clone, Default)]
pub struct DayQuotes {
    by_time: BTreeMap<NaiveDateTime, HashMap<String, Decimal>>,
}

impl DayQuotes {
    fn insert(&mut self, quote: OptionQuote) {
        self.by_time
            .entry(quote.timestamp)
            .or_default()
            .insert(quote.contract, quote.close);
    }

    /// Earliest quote timestamp of the day.
    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.by_time.keys().next().copied()
    }

    /// Latest quote timestamp of the day.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.by_time.keys().next_back().copied()
    }

    /// Distinct timestamps strictly after `after`, in chronological order.
    pub fn timestamps_after(
        &self,
        after: NaiveDateTime,
    ) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.by_time
            .keys()
            .copied()
            .skip_while(move |ts| *ts <= after)
    }

    /// Usable close of `contract` at `timestamp`.
    ///
    /// Missing and non-positive prices are both reported as `None`.
    pub fn price(&self, timestamp: NaiveDateTime, contract: &str) -> Option<Decimal> {
        self.by_time
            .get(&timestamp)
            .and_then(|row| row.get(contract))
            .copied()
            .filter(|p| *p > Decimal::ZERO)
    }
}

/// Underlying prices, contracts and option quotes for one ticker.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    ticker: String,
    underlying: Vec<PricePoint>,
    contracts: Vec<OptionContract>,
    quotes: BTreeMap<NaiveDate, DayQuotes>,
    quote_count: usize,
}

impl MarketData {
    /// Build the tables. Input order does not matter; for duplicate
    /// (contract, timestamp) rows the last one wins.
    pub fn new(
        ticker: &str,
        mut underlying: Vec<PricePoint>,
        mut contracts: Vec<OptionContract>,
        quotes: Vec<OptionQuote>,
    ) -> Self {
        underlying.sort_by_key(|p| p.timestamp);
        contracts.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        contracts.dedup_by(|a, b| a.identifier == b.identifier);

        let quote_count = quotes.len();
        let mut by_day: BTreeMap<NaiveDate, DayQuotes> = BTreeMap::new();
        for quote in quotes {
            by_day
                .entry(quote.timestamp.date())
                .or_default()
                .insert(quote);
        }

        Self {
            ticker: ticker.to_string(),
            underlying,
            contracts,
            quotes: by_day,
            quote_count,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Underlying series, sorted by timestamp.
    pub fn underlying(&self) -> &[PricePoint] {
        &self.underlying
    }

    /// Known contracts, sorted by identifier.
    pub fn contracts(&self) -> &[OptionContract] {
        &self.contracts
    }

    /// Total option quote rows loaded.
    pub fn quote_count(&self) -> usize {
        self.quote_count
    }

    /// Distinct days present in the underlying series, ascending.
    pub fn trading_days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self.underlying.iter().map(|p| p.date()).collect();
        days.dedup();
        days
    }

    /// Underlying bars for one day.
    pub fn underlying_on(&self, date: NaiveDate) -> &[PricePoint] {
        let start = self.underlying.partition_point(|p| p.date() < date);
        let end = self.underlying.partition_point(|p| p.date() <= date);
        &self.underlying[start..end]
    }

    /// Underlying close at the bar nearest to `at` on the same day.
    /// The earlier bar wins ties.
    pub fn spot_near(&self, at: NaiveDateTime) -> Option<Decimal> {
        self.underlying_on(at.date())
            .iter()
            .min_by_key(|p| (p.timestamp - at).num_milliseconds().abs())
            .map(|p| p.close)
    }

    /// Option quotes for one day.
    pub fn quotes_on(&self, date: NaiveDate) -> Option<&DayQuotes> {
        self.quotes.get(&date)
    }

    /// Calls that are still trading on `date`.
    pub fn active_calls(&self, date: NaiveDate) -> impl Iterator<Item = &OptionContract> + '_ {
        self.contracts
            .iter()
            .filter(move |c| c.is_call() && c.is_active_on(date))
    }

    /// First and last timestamps of the underlying series.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.underlying.first()?.timestamp, self.underlying.last()?.timestamp))
    }

    /// Days with at least one option quote.
    pub fn quote_days(&self) -> usize {
        self.quotes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::OptionType;
    use rust_decimal_macros::dec;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn quote(contract: &str, timestamp: NaiveDateTime, close: Decimal) -> OptionQuote {
        OptionQuote {
            contract: contract.to_string(),
            timestamp,
            close,
        }
    }

    fn sample() -> MarketData {
        let underlying = vec![
            PricePoint { timestamp: ts(4, 10, 0), close: dec!(101) },
            PricePoint { timestamp: ts(3, 10, 0), close: dec!(100) },
            PricePoint { timestamp: ts(3, 10, 10), close: dec!(100.5) },
        ];
        let contracts = vec![
            OptionContract {
                identifier: "SPY250305C00100000".to_string(),
                root: "SPY".to_string(),
                expiration: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
                option_type: OptionType::Call,
                strike: dec!(100),
            },
            OptionContract {
                identifier: "SPY250305P00100000".to_string(),
                root: "SPY".to_string(),
                expiration: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
                option_type: OptionType::Put,
                strike: dec!(100),
            },
        ];
        let quotes = vec![
            quote("SPY250305C00100000", ts(3, 10, 5), dec!(1.5)),
            quote("SPY250305C00100000", ts(3, 9, 30), dec!(1.2)),
            quote("SPY250305P00100000", ts(3, 9, 30), dec!(0)),
        ];
        MarketData::new("SPY", underlying, contracts, quotes)
    }

    #[test]
    fn test_trading_days_sorted_and_unique() {
        let market = sample();
        assert_eq!(
            market.trading_days(),
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
            ]
        );
        assert_eq!(market.underlying_on(ts(3, 0, 0).date()).len(), 2);
    }

    #[test]
    fn test_day_quotes_ordering_and_validity() {
        let market = sample();
        let day = market.quotes_on(ts(3, 0, 0).date()).unwrap();
        assert_eq!(day.first_timestamp(), Some(ts(3, 9, 30)));
        assert_eq!(day.last_timestamp(), Some(ts(3, 10, 5)));
        assert_eq!(
            day.timestamps_after(ts(3, 9, 30)).collect::<Vec<_>>(),
            vec![ts(3, 10, 5)]
        );
        assert_eq!(day.price(ts(3, 9, 30), "SPY250305C00100000"), Some(dec!(1.2)));
        // Zero close is unavailable, not zero-valued.
        assert_eq!(day.price(ts(3, 9, 30), "SPY250305P00100000"), None);
        assert_eq!(day.price(ts(3, 9, 30), "missing"), None);
    }

    #[test]
    fn test_spot_near_picks_closest_bar() {
        let market = sample();
        assert_eq!(market.spot_near(ts(3, 10, 6)), Some(dec!(100.5)));
        // Equidistant: earlier bar wins.
        assert_eq!(market.spot_near(ts(3, 10, 5)), Some(dec!(100)));
        assert_eq!(market.spot_near(ts(5, 10, 0)), None);
    }

    #[test]
    fn test_active_calls_excludes_puts_and_expired() {
        let market = sample();
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(market.active_calls(day).count(), 1);
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(market.active_calls(expiry).count(), 0);
    }

    #[test]
    fn test_time_range_spans_underlying() {
        let market = sample();
        assert_eq!(market.time_range(), Some((ts(3, 10, 0), ts(4, 10, 0))));
        assert_eq!(market.quote_days(), 1);
        assert_eq!(MarketData::default().time_range(), None);
    }
}
