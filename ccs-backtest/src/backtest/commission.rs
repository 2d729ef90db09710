//! Position sizing and trading costs.
//!
//! Default: 2 spreads of 100 shares each, $2.50 flat per round trip.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// P&L of a closed trade in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeCost {
    /// Per-share P&L scaled by position size.
    pub gross: Decimal,
    /// Flat cost charged on the trade.
    pub cost: Decimal,
    /// `gross - cost`.
    pub net: Decimal,
}

/// Configurable sizing and commission model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionModel {
    /// Spreads traded per entry.
    pub contracts: u32,
    /// Shares per contract.
    pub multiplier: u32,
    /// Flat cost per trade (entry and exit together).
    pub flat_per_trade: Decimal,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self {
            contracts: 2,
            multiplier: 100,
            flat_per_trade: Decimal::new(25, 1), // $2.50
        }
    }
}

impl CommissionModel {
    /// Create a zero-commission model with the default size.
    pub fn zero() -> Self {
        Self {
            flat_per_trade: Decimal::ZERO,
            ..Default::default()
        }
    }

    /// Shares controlled by one entry.
    pub fn position_multiplier(&self) -> Decimal {
        Decimal::from(self.contracts) * Decimal::from(self.multiplier)
    }

    /// Scale a per-share exit P&L to the whole position and charge costs.
    pub fn calculate(&self, per_share_pnl: Decimal) -> TradeCost {
        let gross = per_share_pnl * self.position_multiplier();
        TradeCost {
            gross,
            cost: self.flat_per_trade,
            net: gross - self.flat_per_trade,
        }
    }

    /// Net P&L of a trade with the given per-share exit P&L.
    pub fn net_pnl(&self, per_share_pnl: Decimal) -> Decimal {
        self.calculate(per_share_pnl).net
    }
}
