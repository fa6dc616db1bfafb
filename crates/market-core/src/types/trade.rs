//! Executed trade records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One symbol's share delta for a rebalancing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Rebalance date.
    pub date: NaiveDate,
    /// Traded symbol.
    pub symbol: String,
    /// Signed share change (positive buys, negative sells).
    pub shares_delta: Decimal,
    /// Execution price (the day's close).
    pub price: Decimal,
}

impl Trade {
    pub fn new(
        date: NaiveDate,
        symbol: impl Into<String>,
        shares_delta: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            date,
            symbol: symbol.into(),
            shares_delta,
            price,
        }
    }

    pub fn side(&self) -> TradeSide {
        if self.shares_delta.is_sign_negative() {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }

    /// Absolute traded notional.
    pub fn notional(&self) -> Decimal {
        (self.shares_delta * self.price).abs()
    }

    /// Absolute share count.
    pub fn quantity(&self) -> Decimal {
        self.shares_delta.abs()
    }
}
