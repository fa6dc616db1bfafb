//! Validated target allocations returned by strategies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AllocationError;

/// Target weights as percent of equity, keyed by symbol.
///
/// Weights need not sum to 100; the remainder stays in cash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetAllocation {
    weights: BTreeMap<String, Decimal>,
}

impl TargetAllocation {
    /// An all-cash allocation.
    pub fn cash() -> Self {
        Self::default()
    }

    /// A single-symbol allocation.
    pub fn single(symbol: impl Into<String>, percent: Decimal) -> Self {
        Self::cash().with(symbol, percent)
    }

    /// Add or replace a weight.
    pub fn with(mut self, symbol: impl Into<String>, percent: Decimal) -> Self {
        self.set(symbol, percent);
        self
    }

    pub fn set(&mut self, symbol: impl Into<String>, percent: Decimal) {
        self.weights.insert(symbol.into(), percent);
    }

    /// Weight for a symbol; zero when absent.
    pub fn weight(&self, symbol: &str) -> Decimal {
        self.weights.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.weights.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Net sum of weights.
    pub fn total(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    /// Sum of absolute weights.
    pub fn gross(&self) -> Decimal {
        self.weights.values().map(|w| w.abs()).sum()
    }

    /// Check the allocation against the engine's margin settings.
    ///
    /// Without margin every weight must be non-negative and the total at most
    /// 100. With margin, shorts are allowed and gross exposure is capped at
    /// `100 * max_leverage`.
    pub fn validate(&self, allow_margin: bool, max_leverage: Decimal) -> Result<(), AllocationError> {
        if !allow_margin {
            if let Some((symbol, weight)) = self.weights.iter().find(|(_, w)| w.is_sign_negative() && !w.is_zero()) {
                return Err(AllocationError::NegativeWeight {
                    symbol: symbol.clone(),
                    weight: *weight,
                });
            }
            let total = self.total();
            if total > Decimal::ONE_HUNDRED {
                return Err(AllocationError::OverAllocated { total });
            }
            return Ok(());
        }

        let gross = self.gross();
        let limit = Decimal::ONE_HUNDRED * max_leverage;
        if gross > limit {
            return Err(AllocationError::ExceedsLeverage { gross, limit });
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for TargetAllocation {
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().map(|(s, w)| (s.into(), w)).collect(),
        }
    }
}
