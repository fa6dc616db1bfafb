//! Strategy interface and built-in allocators.
//!
//! A strategy is queried once per rebalance date with a read-only view of
//! everything known up to and including that date. It answers with target
//! weights; the engine owns all trading.

use chrono::NaiveDate;
use market_core::{Portfolio, PriceMap, PricePoint, StrategyError, TargetAllocation};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Per-symbol bars up to the current date. Nothing later is reachable.
pub type HistoryView<'a> = BTreeMap<&'a str, &'a [PricePoint]>;

/// Read-only snapshot handed to [`Strategy::allocate`].
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Date being simulated.
    pub date: NaiveDate,
    /// History for every loaded symbol, truncated at `date`.
    pub history: &'a HistoryView<'a>,
    /// Portfolio before today's trades.
    pub portfolio: &'a Portfolio,
    /// Closes of symbols with a bar today.
    pub prices: &'a PriceMap,
}

impl<'a> StrategyContext<'a> {
    /// Bars for `symbol`, empty when unknown.
    pub fn history(&self, symbol: &str) -> &'a [PricePoint] {
        self.history.get(symbol).copied().unwrap_or(&[])
    }

    /// Close prices for `symbol`, oldest first.
    pub fn closes(&self, symbol: &str) -> Vec<Decimal> {
        self.history(symbol).iter().map(|p| p.close).collect()
    }

    /// Today's close, if the symbol traded today.
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    /// Symbols with any history.
    pub fn symbols(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.history.keys().copied()
    }
}

/// Allocation rule driven by the engine.
///
/// Implementations must be deterministic given the same context sequence;
/// state carried between calls lives in `self`.
pub trait Strategy {
    /// Name used in results and logs.
    fn name(&self) -> &str;

    /// Target weights in percent for the context's date.
    ///
    /// An error aborts the run.
    fn allocate(&mut self, ctx: &StrategyContext<'_>) -> Result<TargetAllocation, StrategyError>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, ctx: &StrategyContext<'_>) -> Result<TargetAllocation, StrategyError> {
        (**self).allocate(ctx)
    }
}

/// Constant target weights, re-applied on every rebalance.
#[derive(Debug, Clone)]
pub struct FixedAllocation {
    name: String,
    allocation: TargetAllocation,
}

impl FixedAllocation {
    pub fn new(name: impl Into<String>, allocation: TargetAllocation) -> Self {
        Self {
            name: name.into(),
            allocation,
        }
    }

    /// 100% in one symbol.
    pub fn buy_and_hold(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self::new(
            format!("buy_and_hold_{}", symbol.to_ascii_lowercase()),
            TargetAllocation::single(symbol, Decimal::ONE_HUNDRED),
        )
    }

    pub fn allocation(&self) -> &TargetAllocation {
        &self.allocation
    }
}

impl Strategy for FixedAllocation {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, _ctx: &StrategyContext<'_>) -> Result<TargetAllocation, StrategyError> {
        Ok(self.allocation.clone())
    }
}

/// Strategy backed by a closure.
pub struct FnStrategy<F> {
    name: String,
    allocate: F,
}

impl<F> FnStrategy<F>
where
    F: FnMut(&StrategyContext<'_>) -> Result<TargetAllocation, StrategyError>,
{
    pub fn new(name: impl Into<String>, allocate: F) -> Self {
        Self {
            name: name.into(),
            allocate,
        }
    }
}

impl<F> Strategy for FnStrategy<F>
where
    F: FnMut(&StrategyContext<'_>) -> Result<TargetAllocation, StrategyError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, ctx: &StrategyContext<'_>) -> Result<TargetAllocation, StrategyError> {
        (self.allocate)(ctx)
    }
}

/// Wrap a closure as a [`Strategy`].
pub fn from_fn<F>(name: impl Into<String>, allocate: F) -> FnStrategy<F>
where
    F: FnMut(&StrategyContext<'_>) -> Result<TargetAllocation, StrategyError>,
{
    FnStrategy::new(name, allocate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::MarketSeries;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_context_accessors() {
        let closes = [Decimal::new(100, 0), Decimal::new(101, 0), Decimal::new(102, 0)];
        let series = MarketSeries::from_closes("SPY", day(1), &closes).unwrap();
        let history: HistoryView = [("SPY", series.up_to(day(2)))].into_iter().collect();
        let portfolio = Portfolio::new(Decimal::new(1000, 0));
        let prices: PriceMap = [("SPY".to_string(), Decimal::new(101, 0))].into_iter().collect();

        let ctx = StrategyContext {
            date: day(2),
            history: &history,
            portfolio: &portfolio,
            prices: &prices,
        };

        assert_eq!(ctx.closes("SPY"), vec![Decimal::new(100, 0), Decimal::new(101, 0)]);
        assert!(ctx.history("QQQ").is_empty());
        assert_eq!(ctx.price("SPY"), Some(Decimal::new(101, 0)));
        assert_eq!(ctx.symbols().collect::<Vec<_>>(), vec!["SPY"]);
    }

    #[test]
    fn test_fn_strategy_keeps_state() {
        let history = HistoryView::new();
        let portfolio = Portfolio::new(Decimal::ONE);
        let prices = PriceMap::new();
        let ctx = StrategyContext {
            date: day(1),
            history: &history,
            portfolio: &portfolio,
            prices: &prices,
        };

        let mut calls = 0;
        let mut strategy = from_fn("counter", |_ctx| {
            calls += 1;
            if calls > 1 {
                Err(StrategyError::new("only one call allowed"))
            } else {
                Ok(TargetAllocation::cash())
            }
        });

        assert_eq!(strategy.name(), "counter");
        assert!(strategy.allocate(&ctx).is_ok());
        assert!(strategy.allocate(&ctx).is_err());
    }

    #[test]
    fn test_buy_and_hold_name() {
        let strategy = FixedAllocation::buy_and_hold("SPY");
        assert_eq!(strategy.name(), "buy_and_hold_spy");
        assert_eq!(strategy.allocation().weight("SPY"), Decimal::ONE_HUNDRED);
    }
}
