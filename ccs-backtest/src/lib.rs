pub mod backtest;
pub mod config;
pub mod data;
pub mod metrics;
pub mod pricing;
pub mod trend;

// Re-export commonly used types
pub use backtest::{
    BacktestEngine, BacktestResult, CallCreditSpreadStrategy, DayOutcome, SkipReason,
    StrategyConfig, Trade, TradeLedger,
};
pub use config::{BacktestConfig, ConfigError};
pub use data::{DataLoader, MarketData, OptionContract, OptionQuote, OptionType, PricePoint};
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use pricing::{BlackScholes, PricingError};
pub use trend::{daily_summaries, DailySummary};
