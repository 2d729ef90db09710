//! Daily summaries and the moving-average trend filter.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::PricePoint;

/// End-of-day state for one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,

    /// Last close of the day.
    pub close: Decimal,

    /// Moving average of daily closes, once enough days are available.
    pub ma: Option<Decimal>,

    /// Percent change of `ma` versus the previous day.
    pub ma_change_pct: Option<f64>,
}

/// Trend classification from a moving-average change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendState {
    /// Not enough history to compute the change.
    Unknown,
    /// Change above the threshold.
    Uptrend,
    /// Change at or below the threshold.
    Neutral,
}

impl DailySummary {
    /// Classify this day's trend against `max_change_pct`.
    pub fn trend(&self, max_change_pct: f64) -> TrendState {
        match self.ma_change_pct {
            None => TrendState::Unknown,
            Some(change) if change > max_change_pct => TrendState::Uptrend,
            Some(_) => TrendState::Neutral,
        }
    }
}

/// Build one summary per day from a timestamp-sorted series.
///
/// `window` is the number of daily closes in the moving average; a window
/// of zero never produces an average.
pub fn daily_summaries(points: &[PricePoint], window: usize) -> Vec<DailySummary> {
    let mut closes: Vec<(NaiveDate, Decimal)> = Vec::new();
    for point in points {
        let date = point.date();
        if let Some(last) = closes.last_mut().filter(|(d, _)| *d == date) {
            last.1 = point.close;
        } else {
            closes.push((date, point.close));
        }
    }

    let mut summaries: Vec<DailySummary> = Vec::with_capacity(closes.len());
    for (i, &(date, close)) in closes.iter().enumerate() {
        let ma = moving_average(&closes[..=i], window);
        let previous_ma = summaries.last().and_then(|s| s.ma);
        let ma_change_pct = match (previous_ma, ma) {
            (Some(prev), Some(curr)) => percent_change(prev, curr),
            _ => None,
        };

        summaries.push(DailySummary {
            date,
            close,
            ma,
            ma_change_pct,
        });
    }

    summaries
}

fn moving_average(closes: &[(NaiveDate, Decimal)], window: usize) -> Option<Decimal> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let sum: Decimal = closes[closes.len() - window..].iter().map(|(_, c)| *c).sum();
    Some(sum / Decimal::from(window as u64))
}

fn percent_change(previous: Decimal, current: Decimal) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    let prev = previous.to_f64()?;
    let curr = current.to_f64()?;
    Some((curr - prev) / prev * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn bar(day: u32, hour: u32, close: Decimal) -> PricePoint {
        PricePoint {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            close,
        }
    }

    #[test]
    fn test_last_close_per_day() {
        let points = vec![
            bar(3, 10, dec!(99)),
            bar(3, 15, dec!(100)),
            bar(4, 10, dec!(101)),
        ];
        let summaries = daily_summaries(&points, 5);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].close, dec!(100));
        assert_eq!(summaries[1].close, dec!(101));
        assert!(summaries.iter().all(|s| s.ma.is_none()));
    }

    #[test]
    fn test_moving_average_and_change() {
        let points: Vec<PricePoint> = (0..6)
            .map(|i| bar(3 + i, 15, Decimal::from(100 + i)))
            .collect();
        let summaries = daily_summaries(&points, 5);

        assert_eq!(summaries[3].ma, None);
        assert_eq!(summaries[4].ma, Some(dec!(102)));
        // First average has nothing to compare with.
        assert_eq!(summaries[4].ma_change_pct, None);
        assert_eq!(summaries[5].ma, Some(dec!(103)));
        assert_relative_eq!(
            summaries[5].ma_change_pct.unwrap(),
            100.0 / 102.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_trend_state() {
        let mut summary = DailySummary {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            close: dec!(100),
            ma: Some(dec!(100)),
            ma_change_pct: None,
        };
        assert_eq!(summary.trend(1.0), TrendState::Unknown);

        summary.ma_change_pct = Some(1.5);
        assert_eq!(summary.trend(1.0), TrendState::Uptrend);

        summary.ma_change_pct = Some(1.0);
        assert_eq!(summary.trend(1.0), TrendState::Neutral);

        summary.ma_change_pct = Some(-3.0);
        assert_eq!(summary.trend(1.0), TrendState::Neutral);
    }
}
