//! Backtest configuration.
//!
//! Loaded from TOML; every field is optional and falls back to its default.
//! See `config/default.toml` for the full set of keys.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::{CommissionModel, StrategyConfig};

const MINUTES_PER_DAY: i32 = 24 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level backtest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Underlying symbol.
    pub ticker: String,

    /// Root of the parquet data tree.
    pub data_dir: PathBuf,

    /// Where reports and logs are written.
    pub output_dir: PathBuf,

    /// First trading day to evaluate (inclusive).
    pub start_date: Option<NaiveDate>,

    /// Last trading day to evaluate (inclusive).
    pub end_date: Option<NaiveDate>,

    /// Offset applied to epoch timestamps to get local market time.
    pub utc_offset_minutes: i32,

    /// Strategy thresholds.
    pub strategy: StrategyConfig,

    /// Position size and costs.
    pub commission: CommissionModel,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            ticker: "SPY".to_string(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            start_date: None,
            end_date: None,
            utc_offset_minutes: 0,
            strategy: StrategyConfig::default(),
            commission: CommissionModel::default(),
        }
    }
}

impl BacktestConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the backtest cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        let c = &self.commission;

        let checks: [(bool, &str); 13] = [
            (!self.ticker.trim().is_empty(), "ticker must not be empty"),
            (
                self.utc_offset_minutes.abs() < MINUTES_PER_DAY,
                "utc_offset_minutes must be less than a day",
            ),
            (s.ma_window > 0, "strategy.ma_window must be at least 1"),
            (
                s.days_per_year.is_finite() && s.days_per_year > 0.0,
                "strategy.days_per_year must be positive",
            ),
            (s.risk_free_rate.is_finite(), "strategy.risk_free_rate must be finite"),
            (
                s.iv_bracket.lower > 0.0 && s.iv_bracket.upper > s.iv_bracket.lower,
                "strategy.iv_bracket must satisfy 0 < lower < upper",
            ),
            (s.max_iv > 0.0, "strategy.max_iv must be positive"),
            (
                s.max_sell_delta > 0.0 && s.max_sell_delta <= 1.0,
                "strategy.max_sell_delta must be in (0, 1]",
            ),
            (s.min_strike_width > Decimal::ZERO, "strategy.min_strike_width must be positive"),
            (s.min_credit >= Decimal::ZERO, "strategy.min_credit must not be negative"),
            (
                s.stop_loss_buffer >= Decimal::ZERO,
                "strategy.stop_loss_buffer must not be negative",
            ),
            (
                c.contracts > 0 && c.multiplier > 0,
                "commission.contracts and commission.multiplier must be positive",
            ),
            (
                c.flat_per_trade >= Decimal::ZERO,
                "commission.flat_per_trade must not be negative",
            ),
        ];

        if let Some((_, message)) = checks.iter().find(|(ok, _)| !ok) {
            return Err(ConfigError::Invalid(message.to_string()));
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = BacktestConfig::default();
        assert_eq!(config.ticker, "SPY");
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.strategy.max_iv, 0.75);
        assert_eq!(config.commission.flat_per_trade, dec!(2.5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BacktestConfig::from_toml_str(
            r#"
            ticker = "QQQ"
            start_date = "2025-01-02"
            utc_offset_minutes = -300

            [strategy]
            max_sell_delta = 0.30
            min_credit = "0.40"
            exit_time = "15:00:00"

            [strategy.iv_bracket]
            lower = 0.01
            upper = 3.0
            "#,
        )
        .unwrap();

        assert_eq!(config.ticker, "QQQ");
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(config.end_date, None);
        assert_eq!(config.utc_offset_minutes, -300);
        assert_eq!(config.strategy.max_sell_delta, 0.30);
        assert_eq!(config.strategy.min_credit, dec!(0.40));
        assert_eq!(config.strategy.exit_time, NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert_eq!(config.strategy.iv_bracket.upper, 3.0);
        assert_eq!(config.strategy.ma_window, 5);
        assert_eq!(config.commission.contracts, 2);
    }

    #[test]
    fn test_default_toml_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let config = BacktestConfig::from_toml_file(&path).unwrap();
        let defaults = BacktestConfig::default();
        assert_eq!(config.ticker, defaults.ticker);
        assert_eq!(config.strategy.min_strike_width, defaults.strategy.min_strike_width);
        assert_eq!(config.strategy.exit_time, defaults.strategy.exit_time);
        assert_eq!(config.commission.flat_per_trade, defaults.commission.flat_per_trade);
        assert_eq!(config.utc_offset_minutes, 0);
    }

    #[test]
    fn test_eastern_offsets_validate() {
        for offset in [-300, -240] {
            let config =
                BacktestConfig::from_toml_str(&format!("utc_offset_minutes = {}", offset)).unwrap();
            assert_eq!(config.utc_offset_minutes, offset);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BacktestConfig::default();
        config.strategy.ma_window = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BacktestConfig::default();
        config.start_date = NaiveDate::from_ymd_opt(2025, 3, 10);
        config.end_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            BacktestConfig::from_toml_str("ticker = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BacktestConfig::from_toml_file(Path::new("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
