//! Option identifier parsing.
//!
//! Contract files are named after their identifier, which follows the
//! OCC-style layout `<ROOT><YYMMDD><C|P><STRIKE>` with an optional
//! `O:` vendor prefix, e.g. `O:SPY250321C00560000`:
//!
//! - root: `SPY`
//! - expiration: 2025-03-21
//! - type: call
//! - strike: `00560000` thousandths, i.e. 560.000

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{OptionContract, OptionType};

/// Length of the fixed-width suffix: 6 date digits, 1 type letter, 8 strike digits.
const SUFFIX_LEN: usize = 15;

/// Strike digits are integer thousandths of a price unit.
const STRIKE_SCALE: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractParseError {
    #[error("Identifier too short: {0}")]
    TooShort(String),

    #[error("Identifier is not ASCII: {0}")]
    NotAscii(String),

    #[error("Invalid underlying root in {0}")]
    InvalidRoot(String),

    #[error("Invalid expiration date in {0}")]
    InvalidExpiration(String),

    #[error("Invalid option type '{kind}' in {identifier}")]
    InvalidOptionType { identifier: String, kind: char },

    #[error("Invalid strike in {0}")]
    InvalidStrike(String),
}

/// Parse an option identifier into a contract.
///
/// The returned contract keeps `identifier` verbatim (prefix included) so it
/// can be matched against quote rows.
pub fn parse_identifier(identifier: &str) -> Result<OptionContract, ContractParseError> {
    if !identifier.is_ascii() {
        return Err(ContractParseError::NotAscii(identifier.to_string()));
    }

    // Vendor prefix, if any, ends at the last ':'.
    let symbol = identifier.rsplit(':').next().unwrap_or(identifier);
    if symbol.len() <= SUFFIX_LEN {
        return Err(ContractParseError::TooShort(identifier.to_string()));
    }

    let (root, suffix) = symbol.split_at(symbol.len() - SUFFIX_LEN);
    let (date_part, rest) = suffix.split_at(6);
    let (type_part, strike_part) = rest.split_at(1);

    if !root.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ContractParseError::InvalidRoot(identifier.to_string()));
    }

    let expiration = parse_expiration(date_part)
        .ok_or_else(|| ContractParseError::InvalidExpiration(identifier.to_string()))?;

    let option_type = OptionType::from_str(type_part).ok_or_else(|| {
        ContractParseError::InvalidOptionType {
            identifier: identifier.to_string(),
            kind: type_part.chars().next().unwrap_or('?'),
        }
    })?;

    if !strike_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ContractParseError::InvalidStrike(identifier.to_string()));
    }
    let raw_strike: i64 = strike_part
        .parse()
        .map_err(|_| ContractParseError::InvalidStrike(identifier.to_string()))?;
    if raw_strike == 0 {
        return Err(ContractParseError::InvalidStrike(identifier.to_string()));
    }

    Ok(OptionContract {
        identifier: identifier.to_string(),
        root: root.to_string(),
        expiration,
        option_type,
        strike: Decimal::new(raw_strike, STRIKE_SCALE).normalize(),
    })
}

/// Identifier encoded in a contract file's name (its stem).
pub fn identifier_from_path(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// `YYMMDD`, years interpreted as 20YY.
fn parse_expiration(digits: &str) -> Option<NaiveDate> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let day: u32 = digits[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}
