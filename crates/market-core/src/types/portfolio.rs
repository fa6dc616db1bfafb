//! Simulated portfolio state: cash plus per-symbol share counts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::market::PriceMap;

/// Cash balance and share positions.
///
/// Holds no invariants of its own; the engine sizes trades before applying
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Cash balance.
    pub cash: Decimal,
    /// Shares held per symbol. Fractional; negative for shorts.
    pub positions: BTreeMap<String, Decimal>,
}

impl Portfolio {
    /// Create a portfolio holding only cash.
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
        }
    }

    /// Shares held for a symbol (zero when flat).
    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Mark-to-market value of positions only.
    ///
    /// A symbol without a price contributes zero rather than failing.
    pub fn market_value(&self, prices: &PriceMap) -> Decimal {
        self.positions
            .iter()
            .map(|(symbol, shares)| {
                prices
                    .get(symbol)
                    .map(|price| *shares * *price)
                    .unwrap_or(Decimal::ZERO)
            })
            .sum()
    }

    /// Cash plus mark-to-market of all positions.
    pub fn value(&self, prices: &PriceMap) -> Decimal {
        self.cash + self.market_value(prices)
    }

    /// Apply a signed share delta at `price`.
    pub fn apply_trade(&mut self, symbol: &str, shares_delta: Decimal, price: Decimal) {
        self.cash -= shares_delta * price;
        let shares = self.positions.entry(symbol.to_string()).or_insert(Decimal::ZERO);
        *shares += shares_delta;
        if shares.is_zero() {
            self.positions.remove(symbol);
        }
    }

    /// Deduct a non-negative cost from cash.
    pub fn charge(&mut self, amount: Decimal) {
        self.cash -= amount;
    }

    /// Current weights as percent of total value.
    pub fn weights(&self, prices: &PriceMap) -> BTreeMap<String, Decimal> {
        let total = self.value(prices);
        if total.is_zero() {
            return BTreeMap::new();
        }
        self.positions
            .iter()
            .filter_map(|(symbol, shares)| {
                prices
                    .get(symbol)
                    .map(|price| (symbol.clone(), *shares * *price / total * Decimal::ONE_HUNDRED))
            })
            .collect()
    }
}
