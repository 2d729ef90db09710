//! Option pricing.
//!
//! Black-Scholes call pricing, delta, and implied volatility by bracketed
//! root finding.

pub mod black_scholes;

pub use black_scholes::{BlackScholes, PricingError, VolBracket};
