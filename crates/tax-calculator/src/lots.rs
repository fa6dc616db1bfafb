//! Tax lots and realized gain records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days a lot must be held for long-term treatment.
pub const LONG_TERM_DAYS: i64 = 365;

/// Order in which open lots are consumed by a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotMethod {
    /// Oldest lot first.
    #[default]
    Fifo,
    /// Newest lot first.
    Lifo,
}

/// Holding period classification of a realized gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPeriod {
    ShortTerm,
    LongTerm,
}

impl HoldingPeriod {
    /// Short-term below [`LONG_TERM_DAYS`] days held, long-term otherwise.
    pub fn classify(purchase_date: NaiveDate, sale_date: NaiveDate) -> Self {
        if (sale_date - purchase_date).num_days() < LONG_TERM_DAYS {
            HoldingPeriod::ShortTerm
        } else {
            HoldingPeriod::LongTerm
        }
    }
}

/// Shares bought together at one price on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLot {
    /// Lot ID, stable across partial sales.
    pub id: Uuid,
    pub symbol: String,
    /// Shares still open.
    pub quantity: Decimal,
    /// Price per share paid.
    pub purchase_price: Decimal,
    pub purchase_date: NaiveDate,
}

impl TaxLot {
    pub fn new(
        symbol: impl Into<String>,
        quantity: Decimal,
        purchase_price: Decimal,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            quantity,
            purchase_price,
            purchase_date,
        }
    }

    /// Cost basis of the open shares.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.purchase_price
    }
}

/// Gain or loss realized from one lot by one sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalGain {
    /// Sale that realized this gain; shared by every lot the sale consumed.
    pub sale_id: Uuid,
    /// Lot the shares came from.
    pub lot_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_date: NaiveDate,
    pub sale_date: NaiveDate,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub holding_period: HoldingPeriod,
}

impl CapitalGain {
    /// Proceeds minus cost basis. Negative for a loss.
    pub fn gain(&self) -> Decimal {
        self.proceeds - self.cost_basis
    }

    pub fn is_loss(&self) -> bool {
        self.gain() < Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_holding_period_boundary() {
        let bought = date(2023, 1, 1);
        assert_eq!(HoldingPeriod::classify(bought, date(2023, 12, 31)), HoldingPeriod::ShortTerm);
        // Exactly 365 days
        assert_eq!(HoldingPeriod::classify(bought, date(2024, 1, 1)), HoldingPeriod::LongTerm);
    }

    #[test]
    fn test_gain_sign() {
        let gain = CapitalGain {
            sale_id: Uuid::new_v4(),
            lot_id: Uuid::new_v4(),
            symbol: "SPY".into(),
            quantity: Decimal::new(10, 0),
            purchase_date: date(2024, 1, 1),
            sale_date: date(2024, 2, 1),
            cost_basis: Decimal::new(1000, 0),
            proceeds: Decimal::new(900, 0),
            holding_period: HoldingPeriod::ShortTerm,
        };
        assert_eq!(gain.gain(), Decimal::new(-100, 0));
        assert!(gain.is_loss());
    }
}
