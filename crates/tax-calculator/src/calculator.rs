//! Lot-level cost-basis tracking over a sequence of buys and sells.
//!
//! Runs after a backtest over its trade log; the engine never calls into it.

use chrono::NaiveDate;
use market_core::{Trade, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, TaxError};
use crate::lots::{CapitalGain, HoldingPeriod, LotMethod, TaxLot};

/// Days before and after a loss sale in which a purchase triggers a wash sale.
pub const WASH_SALE_WINDOW_DAYS: i64 = 30;

/// Shortfall treated as rounding when a sale slightly exceeds open lots.
pub const LOT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 12);

/// Loss sale whose loss is (partly) disallowed by nearby repurchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WashSale {
    /// The loss record.
    pub gain: CapitalGain,
    /// Lots bought inside the window, excluding the one sold.
    pub replacement_lots: Vec<Uuid>,
    /// Loss disallowed, capped at the shares repurchased. Positive.
    pub disallowed_loss: Decimal,
}

/// Realized gains split by holding period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxSummary {
    pub short_term_gains: Decimal,
    pub short_term_losses: Decimal,
    pub long_term_gains: Decimal,
    pub long_term_losses: Decimal,
    /// Losses disallowed by wash sales (positive).
    pub disallowed_losses: Decimal,
    pub total_proceeds: Decimal,
    pub num_sales: usize,
}

impl TaxSummary {
    pub fn net_short_term(&self) -> Decimal {
        self.short_term_gains + self.short_term_losses
    }

    pub fn net_long_term(&self) -> Decimal {
        self.long_term_gains + self.long_term_losses
    }

    /// Net realized gain after adding back disallowed losses.
    pub fn net_taxable(&self) -> Decimal {
        self.net_short_term() + self.net_long_term() + self.disallowed_losses
    }

    /// Tax owed on positive net gains in each bucket at the given rates.
    pub fn estimated_tax(&self, short_term_rate: Decimal, long_term_rate: Decimal) -> Decimal {
        self.net_short_term().max(Decimal::ZERO) * short_term_rate
            + self.net_long_term().max(Decimal::ZERO) * long_term_rate
    }
}

#[derive(Debug, Clone)]
struct PurchaseRecord {
    lot_id: Uuid,
    symbol: String,
    quantity: Decimal,
    date: NaiveDate,
}

/// Tracks open lots per symbol and the gains realized from them.
#[derive(Debug, Clone, Default)]
pub struct TaxCalculator {
    method: LotMethod,
    lots: BTreeMap<String, VecDeque<TaxLot>>,
    purchases: Vec<PurchaseRecord>,
    realized: Vec<CapitalGain>,
}

impl TaxCalculator {
    pub fn new(method: LotMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn method(&self) -> LotMethod {
        self.method
    }

    /// Open a new lot and return its ID.
    pub fn record_purchase(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        date: NaiveDate,
    ) -> Result<Uuid> {
        validate(quantity, price)?;

        let lot = TaxLot::new(symbol, quantity, price, date);
        let id = lot.id;
        self.purchases.push(PurchaseRecord {
            lot_id: id,
            symbol: symbol.to_string(),
            quantity,
            date,
        });
        self.lots.entry(symbol.to_string()).or_default().push_back(lot);

        debug!(symbol, quantity = %quantity, price = %price, date = %date, "Recorded purchase");
        Ok(id)
    }

    /// Sell shares from open lots, returning one gain per lot touched.
    ///
    /// Lots are consumed oldest-first (FIFO) or newest-first (LIFO) and split
    /// when only partly sold. Nothing changes if the open lots cannot cover
    /// the sale.
    pub fn record_sale(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        date: NaiveDate,
    ) -> Result<Vec<CapitalGain>> {
        validate(quantity, price)?;

        let available = self.position(symbol);
        if quantity - available > LOT_TOLERANCE {
            return Err(TaxError::InsufficientLots {
                symbol: symbol.to_string(),
                requested: quantity,
                available,
            });
        }
        let quantity = quantity.min(available);

        let sale_id = Uuid::new_v4();
        let mut remaining = quantity;
        let mut gains = Vec::new();

        if let Some(queue) = self.lots.get_mut(symbol) {
            while remaining > Decimal::ZERO {
                let lot = match self.method {
                    LotMethod::Fifo => queue.front_mut(),
                    LotMethod::Lifo => queue.back_mut(),
                };
                let Some(lot) = lot else { break };

                let sold = remaining.min(lot.quantity);
                gains.push(CapitalGain {
                    sale_id,
                    lot_id: lot.id,
                    symbol: symbol.to_string(),
                    quantity: sold,
                    purchase_date: lot.purchase_date,
                    sale_date: date,
                    cost_basis: sold * lot.purchase_price,
                    proceeds: sold * price,
                    holding_period: HoldingPeriod::classify(lot.purchase_date, date),
                });

                lot.quantity -= sold;
                remaining -= sold;
                if lot.quantity.is_zero() {
                    match self.method {
                        LotMethod::Fifo => queue.pop_front(),
                        LotMethod::Lifo => queue.pop_back(),
                    };
                }
            }
            if queue.is_empty() {
                self.lots.remove(symbol);
            }
        }

        debug!(
            symbol,
            quantity = %quantity,
            lots = gains.len(),
            date = %date,
            "Recorded sale"
        );
        self.realized.extend(gains.iter().cloned());
        Ok(gains)
    }

    /// Open lots for a symbol, oldest purchase first.
    pub fn open_lots(&self, symbol: &str) -> impl Iterator<Item = &TaxLot> {
        self.lots.get(symbol).into_iter().flatten()
    }

    /// Shares held across open lots.
    pub fn position(&self, symbol: &str) -> Decimal {
        self.open_lots(symbol).map(|lot| lot.quantity).sum()
    }

    /// Every gain realized so far, in sale order.
    pub fn realized_gains(&self) -> &[CapitalGain] {
        &self.realized
    }

    /// Loss sales with a same-symbol purchase within 30 days either side.
    ///
    /// Losses are matched in sale order and each replacement share absorbs at
    /// most one share of loss. Lots consumed by the loss sale itself never
    /// count as replacements.
    pub fn wash_sales(&self) -> Vec<WashSale> {
        let mut remaining: HashMap<Uuid, Decimal> =
            self.purchases.iter().map(|p| (p.lot_id, p.quantity)).collect();
        let mut washes = Vec::new();

        for gain in self.realized.iter().filter(|gain| gain.is_loss()) {
            let sold_lots: HashSet<Uuid> = self
                .realized
                .iter()
                .filter(|g| g.sale_id == gain.sale_id)
                .map(|g| g.lot_id)
                .collect();

            let mut matched = Decimal::ZERO;
            let mut replacement_lots = Vec::new();
            for purchase in self
                .purchases
                .iter()
                .filter(|p| p.symbol == gain.symbol && !sold_lots.contains(&p.lot_id))
                .filter(|p| (p.date - gain.sale_date).num_days().abs() <= WASH_SALE_WINDOW_DAYS)
            {
                let needed = gain.quantity - matched;
                if needed <= Decimal::ZERO {
                    break;
                }
                let Some(left) = remaining.get_mut(&purchase.lot_id) else {
                    continue;
                };
                let used = (*left).min(needed);
                if used <= Decimal::ZERO {
                    continue;
                }
                *left -= used;
                matched += used;
                replacement_lots.push(purchase.lot_id);
            }

            if matched > Decimal::ZERO {
                washes.push(WashSale {
                    gain: gain.clone(),
                    replacement_lots,
                    disallowed_loss: -gain.gain() * matched / gain.quantity,
                });
            }
        }
        washes
    }

    /// Totals by holding period plus disallowed losses.
    pub fn summary(&self) -> TaxSummary {
        let mut summary = TaxSummary::default();
        let mut sales = HashSet::new();

        for gain in &self.realized {
            let amount = gain.gain();
            match (gain.holding_period, amount >= Decimal::ZERO) {
                (HoldingPeriod::ShortTerm, true) => summary.short_term_gains += amount,
                (HoldingPeriod::ShortTerm, false) => summary.short_term_losses += amount,
                (HoldingPeriod::LongTerm, true) => summary.long_term_gains += amount,
                (HoldingPeriod::LongTerm, false) => summary.long_term_losses += amount,
            }
            summary.total_proceeds += gain.proceeds;
            sales.insert(gain.sale_id);
        }

        summary.num_sales = sales.len();
        summary.disallowed_losses = self.wash_sales().iter().map(|w| w.disallowed_loss).sum();
        summary
    }

    /// Replay an engine trade log in order.
    ///
    /// Fails on a sale that open lots cannot cover, so short positions are
    /// not supported.
    pub fn from_trade_log(trades: &[Trade], method: LotMethod) -> Result<Self> {
        let mut calculator = Self::new(method);
        for trade in trades {
            match trade.side() {
                TradeSide::Buy => {
                    calculator.record_purchase(&trade.symbol, trade.quantity(), trade.price, trade.date)?;
                }
                TradeSide::Sell => {
                    calculator.record_sale(&trade.symbol, trade.quantity(), trade.price, trade.date)?;
                }
            }
        }

        info!(
            trades = trades.len(),
            realized = calculator.realized.len(),
            open_symbols = calculator.lots.len(),
            "Replayed trade log"
        );
        Ok(calculator)
    }
}

fn validate(quantity: Decimal, price: Decimal) -> Result<()> {
    if quantity <= Decimal::ZERO {
        return Err(TaxError::InvalidQuantity { quantity });
    }
    if price < Decimal::ZERO {
        return Err(TaxError::InvalidPrice { price });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n - 1)
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn two_lots(method: LotMethod) -> TaxCalculator {
        let mut calc = TaxCalculator::new(method);
        calc.record_purchase("SPY", dec(50), dec(10), day(1)).unwrap();
        calc.record_purchase("SPY", dec(100), dec(12), day(30)).unwrap();
        calc
    }

    #[test]
    fn test_fifo_splits_second_lot() {
        let mut calc = two_lots(LotMethod::Fifo);
        let gains = calc.record_sale("SPY", dec(100), dec(15), day(60)).unwrap();

        assert_eq!(gains.len(), 2);
        assert_eq!(gains[0].quantity, dec(50));
        assert_eq!(gains[0].purchase_date, day(1));
        assert_eq!(gains[0].gain(), dec(250)); // 50 * (15 - 10)
        assert_eq!(gains[1].quantity, dec(50));
        assert_eq!(gains[1].purchase_date, day(30));
        assert_eq!(gains[1].gain(), dec(150)); // 50 * (15 - 12)
        assert_eq!(gains[0].sale_id, gains[1].sale_id);

        let open: Vec<&TaxLot> = calc.open_lots("SPY").collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity, dec(50));
        assert_eq!(open[0].purchase_date, day(30));
    }

    #[test]
    fn test_lifo_consumes_newest_first() {
        let mut calc = two_lots(LotMethod::Lifo);
        let gains = calc.record_sale("SPY", dec(100), dec(15), day(60)).unwrap();

        assert_eq!(gains.len(), 1);
        assert_eq!(gains[0].purchase_date, day(30));
        assert_eq!(calc.position("SPY"), dec(50));
    }

    #[test]
    fn test_fully_consumed_lots_are_removed() {
        let mut calc = two_lots(LotMethod::Fifo);
        calc.record_sale("SPY", dec(150), dec(11), day(90)).unwrap();
        assert_eq!(calc.open_lots("SPY").count(), 0);
        assert_eq!(calc.position("SPY"), Decimal::ZERO);
    }

    #[test]
    fn test_insufficient_lots_leaves_state_unchanged() {
        let mut calc = two_lots(LotMethod::Fifo);
        let err = calc.record_sale("SPY", dec(200), dec(15), day(60)).unwrap_err();
        assert_eq!(
            err,
            TaxError::InsufficientLots {
                symbol: "SPY".into(),
                requested: dec(200),
                available: dec(150),
            }
        );
        assert_eq!(calc.position("SPY"), dec(150));
        assert!(calc.realized_gains().is_empty());
    }

    #[test]
    fn test_rounding_shortfall_closes_position() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        let third = Decimal::ONE / Decimal::new(3, 0);
        calc.record_purchase("SPY", third, dec(30), day(1)).unwrap();

        let gains = calc.record_sale("SPY", third + Decimal::new(1, 20), dec(33), day(2)).unwrap();
        assert_eq!(gains[0].quantity, third);
        assert_eq!(calc.open_lots("SPY").count(), 0);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        assert!(matches!(
            calc.record_purchase("SPY", Decimal::ZERO, dec(10), day(1)),
            Err(TaxError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            calc.record_purchase("SPY", dec(1), dec(-10), day(1)),
            Err(TaxError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_long_term_classification() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(10), dec(100), day(1)).unwrap();
        calc.record_purchase("SPY", dec(10), dec(100), day(300)).unwrap();
        let gains = calc.record_sale("SPY", dec(20), dec(110), day(400)).unwrap();

        assert_eq!(gains[0].holding_period, HoldingPeriod::LongTerm);
        assert_eq!(gains[1].holding_period, HoldingPeriod::ShortTerm);

        let summary = calc.summary();
        assert_eq!(summary.long_term_gains, dec(100));
        assert_eq!(summary.short_term_gains, dec(100));
        assert_eq!(summary.num_sales, 1);
        assert_eq!(summary.estimated_tax(Decimal::new(3, 1), Decimal::new(15, 2)), dec(45));
    }

    #[test]
    fn test_wash_sale_detection() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(10), dec(100), day(1)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(50)).unwrap();
        // Repurchase 20 days after the loss sale
        let replacement = calc.record_purchase("SPY", dec(5), dec(92), day(70)).unwrap();

        let washes = calc.wash_sales();
        assert_eq!(washes.len(), 1);
        assert_eq!(washes[0].replacement_lots, vec![replacement]);
        // Half the shares were repurchased: 100 * 5/10
        assert_eq!(washes[0].disallowed_loss, dec(50));
        assert_eq!(calc.summary().disallowed_losses, dec(50));
    }

    #[test]
    fn test_wash_sale_replacement_not_shared_across_lots() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(10), dec(100), day(1)).unwrap();
        calc.record_purchase("SPY", dec(10), dec(100), day(2)).unwrap();
        // One sale consuming both lots at a 200 loss
        calc.record_sale("SPY", dec(20), dec(90), day(50)).unwrap();
        let replacement = calc.record_purchase("SPY", dec(10), dec(91), day(60)).unwrap();

        let washes = calc.wash_sales();
        assert_eq!(washes.len(), 1);
        assert_eq!(washes[0].replacement_lots, vec![replacement]);
        assert_eq!(washes[0].disallowed_loss, dec(100));
        assert_eq!(calc.summary().disallowed_losses, dec(100));
    }

    #[test]
    fn test_wash_sale_replacement_not_shared_across_sales() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(20), dec(100), day(1)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(50)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(55)).unwrap();
        calc.record_purchase("SPY", dec(10), dec(91), day(60)).unwrap();

        let washes = calc.wash_sales();
        assert_eq!(washes.len(), 1);
        assert_eq!(washes[0].gain.sale_date, day(50));
        assert_eq!(washes[0].disallowed_loss, dec(100));
        assert_eq!(calc.summary().disallowed_losses, dec(100));
    }

    #[test]
    fn test_wash_sale_splits_replacement_between_sales() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(20), dec(100), day(1)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(50)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(55)).unwrap();
        calc.record_purchase("SPY", dec(15), dec(91), day(60)).unwrap();

        let washes = calc.wash_sales();
        assert_eq!(washes.len(), 2);
        assert_eq!(washes[0].disallowed_loss, dec(100));
        // Only 5 replacement shares are left for the second sale
        assert_eq!(washes[1].disallowed_loss, dec(50));
        assert_eq!(calc.summary().disallowed_losses, dec(150));
    }

    #[test]
    fn test_no_wash_sale_outside_window_or_on_gain() {
        let mut calc = TaxCalculator::new(LotMethod::Fifo);
        calc.record_purchase("SPY", dec(10), dec(100), day(1)).unwrap();
        calc.record_sale("SPY", dec(10), dec(90), day(50)).unwrap();
        calc.record_purchase("SPY", dec(10), dec(95), day(81)).unwrap();
        calc.record_sale("SPY", dec(10), dec(120), day(90)).unwrap();
        // Other symbols never count
        calc.record_purchase("QQQ", dec(10), dec(95), day(55)).unwrap();

        assert!(calc.wash_sales().is_empty());
    }

    #[test]
    fn test_from_trade_log() {
        let trades = vec![
            Trade::new(day(1), "SPY", dec(50), dec(10)),
            Trade::new(day(30), "SPY", dec(100), dec(12)),
            Trade::new(day(60), "SPY", dec(-100), dec(15)),
        ];
        let calc = TaxCalculator::from_trade_log(&trades, LotMethod::Fifo).unwrap();
        assert_eq!(calc.realized_gains().len(), 2);
        assert_eq!(calc.position("SPY"), dec(50));

        let short = vec![Trade::new(day(1), "SPY", dec(-1), dec(10))];
        assert!(matches!(
            TaxCalculator::from_trade_log(&short, LotMethod::Fifo),
            Err(TaxError::InsufficientLots { .. })
        ));
    }
}
