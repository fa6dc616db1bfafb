//! Pluggable cost models charged against cash once per simulated day.
//!
//! Each model is a pure function of the day's trades, the positions after
//! trading, the marks and the date. The engine sums the models and deducts
//! the total once; models never see each other.

use chrono::{Datelike, NaiveDate};
use market_core::{EngineConfig, PriceMap, Trade};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trades smaller than this many shares carry no cost.
pub const MIN_COSTED_SHARES: Decimal = Decimal::from_parts(1, 0, 0, false, 10);

/// Trading days used to turn annual rates into daily ones.
const DAYS_PER_YEAR: Decimal = Decimal::from_parts(252, 0, 0, false, 0);

const BPS_DIVISOR: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// A per-period monetary cost.
pub trait CostModel: fmt::Debug + Send + Sync {
    /// Short identifier used in cost breakdowns.
    fn name(&self) -> &str;

    /// Non-negative cost for `current_date`.
    fn calculate(
        &self,
        trades: &[Trade],
        positions: &BTreeMap<String, Decimal>,
        prices: &PriceMap,
        current_date: NaiveDate,
    ) -> Decimal;
}

/// Commission in basis points of notional plus optional square-root impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCost {
    /// Cost in basis points of traded notional.
    pub base_bps: Decimal,
    /// Multiplier on sqrt(traded notional) per symbol. Zero disables.
    pub impact_factor: Decimal,
}

impl TransactionCost {
    pub fn new(base_bps: Decimal) -> Self {
        Self {
            base_bps,
            impact_factor: Decimal::ZERO,
        }
    }

    /// Add a market-impact term.
    pub fn with_market_impact(mut self, impact_factor: Decimal) -> Self {
        self.impact_factor = impact_factor;
        self
    }
}

impl CostModel for TransactionCost {
    fn name(&self) -> &str {
        "transaction"
    }

    fn calculate(
        &self,
        trades: &[Trade],
        _positions: &BTreeMap<String, Decimal>,
        _prices: &PriceMap,
        _current_date: NaiveDate,
    ) -> Decimal {
        let mut notional_by_symbol: BTreeMap<&str, Decimal> = BTreeMap::new();
        for trade in trades.iter().filter(|t| t.quantity() >= MIN_COSTED_SHARES) {
            *notional_by_symbol.entry(trade.symbol.as_str()).or_default() += trade.notional();
        }

        notional_by_symbol
            .values()
            .map(|value| {
                let commission = *value * self.base_bps / BPS_DIVISOR;
                let impact = if self.impact_factor.is_zero() {
                    Decimal::ZERO
                } else {
                    self.impact_factor * value.sqrt().unwrap_or(Decimal::ZERO)
                };
                commission + impact
            })
            .sum()
    }
}

/// Annualized custody drag on every position, charged daily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingCost {
    /// Annual rate on position value (e.g., 0.001 = 0.1%).
    pub annual_rate: Decimal,
}

impl HoldingCost {
    pub fn new(annual_rate: Decimal) -> Self {
        Self { annual_rate }
    }
}

impl CostModel for HoldingCost {
    fn name(&self) -> &str {
        "holding"
    }

    fn calculate(
        &self,
        _trades: &[Trade],
        positions: &BTreeMap<String, Decimal>,
        prices: &PriceMap,
        _current_date: NaiveDate,
    ) -> Decimal {
        let daily_rate = self.annual_rate / DAYS_PER_YEAR;
        position_values(positions, prices, |_| true) * daily_rate
    }
}

/// Extra annual financing cost of leveraged products by interest-rate era.
///
/// Leveraged funds pay swap financing that tracks short rates, so the real
/// drag differs sharply between regimes even at a constant expense ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraCostSchedule {
    pub pre_1980: Decimal,
    pub from_1980: Decimal,
    pub from_1990: Decimal,
    /// Zero-interest-rate era.
    pub from_2008: Decimal,
    pub from_2016: Decimal,
    pub from_2022: Decimal,
}

impl Default for EraCostSchedule {
    fn default() -> Self {
        Self {
            pre_1980: Decimal::new(25, 3),  // 2.5%
            from_1980: Decimal::new(45, 3), // 4.5%
            from_1990: Decimal::new(20, 3), // 2.0%
            from_2008: Decimal::new(5, 3),  // 0.5%
            from_2016: Decimal::new(10, 3), // 1.0%
            from_2022: Decimal::new(30, 3), // 3.0%
        }
    }
}

impl EraCostSchedule {
    /// Annual excess cost for the year containing `date`.
    pub fn excess_cost(&self, date: NaiveDate) -> Decimal {
        match date.year() {
            y if y < 1980 => self.pre_1980,
            1980..=1989 => self.from_1980,
            1990..=2007 => self.from_1990,
            2008..=2015 => self.from_2008,
            2016..=2021 => self.from_2016,
            _ => self.from_2022,
        }
    }
}

/// Heuristic for recognizing leveraged instruments by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeveragedInstrumentMatcher {
    /// Symbol suffixes marking leverage (e.g., `SPY_3X`).
    pub suffixes: Vec<String>,
    /// Known leveraged tickers.
    pub tickers: Vec<String>,
    /// Substrings that mark leverage anywhere in the symbol.
    pub keywords: Vec<String>,
}

impl Default for LeveragedInstrumentMatcher {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            suffixes: owned(&["2X", "3X", "-2L", "-3L"]),
            tickers: owned(&[
                "SSO", "UPRO", "SPXL", "SDS", "SPXU", "SPXS", "QLD", "TQQQ", "SQQQ", "UDOW",
                "SDOW", "TNA", "TZA", "UBT", "TMF", "TMV", "SOXL", "SOXS", "TECL", "FAS", "FAZ",
                "LABU", "LABD", "UGL", "AGQ",
            ]),
            keywords: owned(&["LEVERAGED", "ULTRA"]),
        }
    }
}

impl LeveragedInstrumentMatcher {
    pub fn is_leveraged(&self, symbol: &str) -> bool {
        let upper = symbol.to_ascii_uppercase();
        self.tickers.iter().any(|t| *t == upper)
            || self.suffixes.iter().any(|s| upper.ends_with(s.as_str()))
            || self.keywords.iter().any(|k| upper.contains(k.as_str()))
    }

    /// Add a ticker to the known list.
    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.tickers.push(ticker.into().to_ascii_uppercase());
        self
    }
}

/// Expense ratio plus era financing cost on leveraged positions, charged daily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeveragedEtfCost {
    /// Total expense ratio (annual).
    pub ter: Decimal,
    pub eras: EraCostSchedule,
    pub matcher: LeveragedInstrumentMatcher,
}

impl Default for LeveragedEtfCost {
    fn default() -> Self {
        Self {
            ter: Decimal::new(95, 4), // 0.95%
            eras: EraCostSchedule::default(),
            matcher: LeveragedInstrumentMatcher::default(),
        }
    }
}

impl LeveragedEtfCost {
    pub fn new(ter: Decimal) -> Self {
        Self {
            ter,
            ..Default::default()
        }
    }

    pub fn with_eras(mut self, eras: EraCostSchedule) -> Self {
        self.eras = eras;
        self
    }

    pub fn with_matcher(mut self, matcher: LeveragedInstrumentMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Daily rate applied on `date`.
    pub fn daily_rate(&self, date: NaiveDate) -> Decimal {
        (self.ter + self.eras.excess_cost(date)) / DAYS_PER_YEAR
    }
}

impl CostModel for LeveragedEtfCost {
    fn name(&self) -> &str {
        "leveraged_etf"
    }

    fn calculate(
        &self,
        _trades: &[Trade],
        positions: &BTreeMap<String, Decimal>,
        prices: &PriceMap,
        current_date: NaiveDate,
    ) -> Decimal {
        let exposure = position_values(positions, prices, |symbol| self.matcher.is_leveraged(symbol));
        exposure * self.daily_rate(current_date)
    }
}

/// Sum of |shares * price| over positions passing `filter`; unpriced
/// positions are ignored.
fn position_values<F>(positions: &BTreeMap<String, Decimal>, prices: &PriceMap, filter: F) -> Decimal
where
    F: Fn(&str) -> bool,
{
    positions
        .iter()
        .filter(|(symbol, _)| filter(symbol))
        .filter_map(|(symbol, shares)| prices.get(symbol).map(|price| (*shares * *price).abs()))
        .sum()
}

/// Cost models implied by an engine configuration, in application order.
pub fn cost_models_from_config(config: &EngineConfig) -> Vec<Box<dyn CostModel>> {
    let mut models: Vec<Box<dyn CostModel>> = Vec::new();

    if config.transaction_cost_bps > Decimal::ZERO || config.market_impact_factor > Decimal::ZERO {
        models.push(Box::new(
            TransactionCost::new(config.transaction_cost_bps)
                .with_market_impact(config.market_impact_factor),
        ));
    }
    if config.holding_cost_annual_rate > Decimal::ZERO {
        models.push(Box::new(HoldingCost::new(config.holding_cost_annual_rate)));
    }
    if config.leveraged_etf_costs {
        models.push(Box::new(LeveragedEtfCost::default()));
    }

    models
}
