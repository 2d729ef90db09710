pub mod contract;
pub mod loader;
pub mod market;
pub mod types;

pub use contract::{identifier_from_path, parse_identifier, ContractParseError};
pub use loader::{DataLoader, LoaderError, CLOSE_COLUMN, TS_COLUMN};
pub use market::{DayQuotes, MarketData};
pub use types::{OptionContract, OptionQuote, OptionType, PricePoint};
