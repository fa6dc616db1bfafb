//! Day-by-day portfolio simulation.
//!
//! Each simulated date runs the same pipeline: look up prices, query the
//! strategy on rebalance dates, diff the target against holdings, execute
//! trades, deduct costs and snapshot equity.

use chrono::NaiveDate;
use market_core::{EngineConfig, Error, MarketData, Portfolio, PriceMap, Result, TargetAllocation, Trade};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calendar::{trading_calendar, RebalanceSchedule};
use crate::costs::{cost_models_from_config, CostModel};
use crate::result::{BacktestResult, EquityCurvePoint};
use crate::strategy::{HistoryView, Strategy, StrategyContext};

/// Progress notification emitted while a run advances.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started {
        strategy: String,
        total_days: usize,
        first_date: NaiveDate,
        last_date: NaiveDate,
    },
    Rebalanced {
        date: NaiveDate,
        trades: usize,
        skipped: usize,
    },
    DayCompleted {
        index: usize,
        total_days: usize,
        date: NaiveDate,
        equity: Decimal,
        /// Symbols marked at a previous close because they had no bar today.
        stale_symbols: Vec<String>,
    },
    Finished {
        final_equity: Decimal,
        trades: usize,
    },
}

/// Callback receiving [`EngineEvent`]s.
pub type ProgressCallback = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Outcome of diffing one symbol's target against its holding.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    Execute(Trade),
    Skip { symbol: String, reason: SkipReason },
}

/// Why a planned trade was not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No positive close for the symbol today.
    MissingPrice,
    /// Share delta below the configured minimum.
    BelowMinimum,
}

/// Drives a strategy over historical data.
pub struct BacktestEngine {
    config: EngineConfig,
    cost_models: Vec<Box<dyn CostModel>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .field("cost_models", &self.cost_models)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BacktestEngine {
    /// Create an engine with the cost models the configuration enables.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cost_models = cost_models_from_config(&config);
        Ok(Self {
            config,
            cost_models,
            progress: None,
        })
    }

    /// Add a cost model after the configured ones.
    pub fn with_cost_model(mut self, model: Box<dyn CostModel>) -> Self {
        self.cost_models.push(model);
        self
    }

    /// Register a progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cost_models(&self) -> &[Box<dyn CostModel>] {
        &self.cost_models
    }

    /// Run a backtest of `strategy` over `market_data`.
    ///
    /// Fails on an empty calendar, a strategy error or an invalid target
    /// allocation. Missing prices and dust trades are skipped, not errors.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        strategy: &mut S,
        market_data: &MarketData,
    ) -> Result<BacktestResult> {
        let calendar = trading_calendar(market_data, self.config.calendar);
        let (first_date, last_date) = match (calendar.first(), calendar.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                let symbols: Vec<&str> = market_data.keys().map(String::as_str).collect();
                return Err(Error::data_unavailable(
                    symbols.join(","),
                    "no simulated dates after calendar alignment",
                ));
            }
        };

        info!(
            strategy = strategy.name(),
            start = %first_date,
            end = %last_date,
            days = calendar.len(),
            symbols = market_data.len(),
            rebalance = %self.config.rebalance,
            "Starting backtest"
        );
        self.emit(|| EngineEvent::Started {
            strategy: strategy.name().to_string(),
            total_days: calendar.len(),
            first_date,
            last_date,
        });

        let mut state = SimulationState::new(self.config.initial_cash, calendar.len());
        let mut schedule = RebalanceSchedule::new(self.config.rebalance);

        for (index, date) in calendar.iter().copied().enumerate() {
            // Prices for symbols with a bar today; everything else keeps its last mark
            let prices: PriceMap = market_data
                .iter()
                .filter_map(|(symbol, series)| series.close_on(date).map(|c| (symbol.clone(), c)))
                .collect();
            state.marks.extend(prices.iter().map(|(s, p)| (s.clone(), *p)));

            let mut day_trades = Vec::new();
            if schedule.is_rebalance_day(date) {
                state.rebalance_dates.push(date);

                let history: HistoryView = market_data
                    .iter()
                    .map(|(symbol, series)| (symbol.as_str(), series.up_to(date)))
                    .collect();
                let ctx = StrategyContext {
                    date,
                    history: &history,
                    portfolio: &state.portfolio,
                    prices: &prices,
                };

                let target = strategy.allocate(&ctx).map_err(|e| Error::Strategy {
                    strategy: strategy.name().to_string(),
                    date,
                    message: e.message,
                })?;
                target.validate(self.config.allow_margin, self.config.max_leverage)?;

                let equity = state.portfolio.value(&state.marks);
                let decisions = self.plan_trades(date, &target, &state.portfolio, &prices, equity);
                let skipped = decisions
                    .iter()
                    .filter(|d| matches!(d, TradeDecision::Skip { .. }))
                    .count();

                day_trades = self.execute_trades(&mut state.portfolio, decisions, &state.marks, date);
                debug!(
                    date = %date,
                    trades = day_trades.len(),
                    skipped,
                    "Rebalanced portfolio"
                );
                self.emit(|| EngineEvent::Rebalanced {
                    date,
                    trades: day_trades.len(),
                    skipped,
                });
            }

            // Costs are charged every simulated day, trades or not
            for model in &self.cost_models {
                let cost = model.calculate(&day_trades, &state.portfolio.positions, &state.marks, date);
                let cost = if cost < Decimal::ZERO {
                    warn!(model = model.name(), cost = %cost, "Cost model returned a negative cost, ignoring");
                    Decimal::ZERO
                } else {
                    cost
                };
                if !cost.is_zero() {
                    state.portfolio.charge(cost);
                    state.total_costs += cost;
                    *state.costs_by_model.entry(model.name().to_string()).or_default() += cost;
                }
            }

            let equity = state.portfolio.value(&state.marks);
            state.equity_curve.push(EquityCurvePoint {
                date,
                total_value: equity,
            });
            state.trade_log.extend(day_trades);

            if self.progress.is_some() {
                let stale_symbols: Vec<String> = state
                    .marks
                    .keys()
                    .filter(|s| !prices.contains_key(*s))
                    .cloned()
                    .collect();
                self.emit(|| EngineEvent::DayCompleted {
                    index,
                    total_days: calendar.len(),
                    date,
                    equity,
                    stale_symbols,
                });
            }
        }

        let result = state.into_result(strategy.name(), &self.config);
        let summary = result.get_performance_summary();

        info!(
            strategy = %result.strategy_name,
            return_pct = summary.total_return,
            sharpe = summary.sharpe_ratio,
            max_drawdown = summary.max_drawdown,
            trades = summary.num_trades,
            costs = %result.total_costs,
            "Backtest completed"
        );
        self.emit(|| EngineEvent::Finished {
            final_equity: summary.final_value,
            trades: summary.num_trades,
        });

        Ok(result)
    }

    /// Run several strategies over the same data, best Sharpe first.
    ///
    /// A failing strategy is logged and left out of the comparison.
    pub fn compare_strategies(
        &self,
        strategies: &mut [Box<dyn Strategy>],
        market_data: &MarketData,
    ) -> Vec<BacktestResult> {
        let mut results = Vec::new();

        for strategy in strategies.iter_mut() {
            match self.run(strategy.as_mut(), market_data) {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Strategy backtest failed");
                }
            }
        }

        crate::result::rank_by_sharpe(results)
    }

    /// Diff the target allocation against current holdings.
    ///
    /// Held symbols absent from the target are liquidated.
    pub fn plan_trades(
        &self,
        date: NaiveDate,
        target: &TargetAllocation,
        portfolio: &Portfolio,
        prices: &PriceMap,
        equity: Decimal,
    ) -> Vec<TradeDecision> {
        let mut symbols: Vec<&str> = target.symbols().collect();
        for held in portfolio.positions.keys() {
            if !symbols.contains(&held.as_str()) {
                symbols.push(held.as_str());
            }
        }
        symbols.sort_unstable();

        symbols
            .into_iter()
            .map(|symbol| {
                let price = match prices.get(symbol) {
                    Some(price) if *price > Decimal::ZERO => *price,
                    _ => {
                        warn!(symbol, date = %date, "No price available, skipping trade");
                        return TradeDecision::Skip {
                            symbol: symbol.to_string(),
                            reason: SkipReason::MissingPrice,
                        };
                    }
                };

                let target_value = equity * target.weight(symbol) / Decimal::ONE_HUNDRED;
                let delta = target_value / price - portfolio.position(symbol);
                if delta.abs() < self.config.min_trade_shares || delta.is_zero() {
                    return TradeDecision::Skip {
                        symbol: symbol.to_string(),
                        reason: SkipReason::BelowMinimum,
                    };
                }
                TradeDecision::Execute(Trade::new(date, symbol, delta, price))
            })
            .collect()
    }

    /// Apply planned trades, sells first.
    ///
    /// Without margin, buys are scaled down uniformly so that cash plus sell
    /// proceeds covers them and the day's estimated costs.
    fn execute_trades(
        &self,
        portfolio: &mut Portfolio,
        decisions: Vec<TradeDecision>,
        marks: &PriceMap,
        date: NaiveDate,
    ) -> Vec<Trade> {
        let (sells, mut buys): (Vec<Trade>, Vec<Trade>) = decisions
            .into_iter()
            .filter_map(|d| match d {
                TradeDecision::Execute(trade) => Some(trade),
                TradeDecision::Skip { .. } => None,
            })
            .partition(|t| t.shares_delta < Decimal::ZERO);

        if !self.config.allow_margin && !buys.is_empty() {
            let sell_proceeds: Decimal = sells.iter().map(Trade::notional).sum();
            let buy_value: Decimal = buys.iter().map(Trade::notional).sum();
            let available = portfolio.cash + sell_proceeds;

            let planned: Vec<Trade> = sells.iter().chain(buys.iter()).cloned().collect();
            let projected = projected_positions(portfolio, &planned);
            let estimated_cost = self.estimate_costs(&planned, &projected, marks, date);

            if buy_value + estimated_cost > available {
                let factor = ((available - estimated_cost) / buy_value)
                    .max(Decimal::ZERO)
                    .min(Decimal::ONE);
                debug!(
                    date = %date,
                    factor = %factor,
                    buy_value = %buy_value,
                    available = %available,
                    "Scaling buys to available cash"
                );
                buys = buys
                    .into_iter()
                    .map(|t| Trade::new(t.date, t.symbol, t.shares_delta * factor, t.price))
                    .filter(|t| t.quantity() >= self.config.min_trade_shares && !t.shares_delta.is_zero())
                    .collect();
            }
        }

        let executed: Vec<Trade> = sells.into_iter().chain(buys).collect();
        for trade in &executed {
            portfolio.apply_trade(&trade.symbol, trade.shares_delta, trade.price);
        }
        executed
    }

    fn estimate_costs(
        &self,
        trades: &[Trade],
        positions: &BTreeMap<String, Decimal>,
        marks: &PriceMap,
        date: NaiveDate,
    ) -> Decimal {
        self.cost_models
            .iter()
            .map(|m| m.calculate(trades, positions, marks, date).max(Decimal::ZERO))
            .sum()
    }

    fn emit<F: FnOnce() -> EngineEvent>(&self, event: F) {
        if let Some(callback) = &self.progress {
            callback(&event());
        }
    }
}

fn projected_positions(portfolio: &Portfolio, trades: &[Trade]) -> BTreeMap<String, Decimal> {
    let mut positions = portfolio.positions.clone();
    for trade in trades {
        *positions.entry(trade.symbol.clone()).or_default() += trade.shares_delta;
    }
    positions.retain(|_, shares| !shares.is_zero());
    positions
}

/// Mutable state of one run.
struct SimulationState {
    portfolio: Portfolio,
    /// Last known close per symbol.
    marks: PriceMap,
    equity_curve: Vec<EquityCurvePoint>,
    trade_log: Vec<Trade>,
    rebalance_dates: Vec<NaiveDate>,
    total_costs: Decimal,
    costs_by_model: BTreeMap<String, Decimal>,
}

impl SimulationState {
    fn new(initial_cash: Decimal, days: usize) -> Self {
        Self {
            portfolio: Portfolio::new(initial_cash),
            marks: PriceMap::new(),
            equity_curve: Vec::with_capacity(days),
            trade_log: Vec::new(),
            rebalance_dates: Vec::new(),
            total_costs: Decimal::ZERO,
            costs_by_model: BTreeMap::new(),
        }
    }

    fn into_result(self, strategy_name: &str, config: &EngineConfig) -> BacktestResult {
        BacktestResult {
            strategy_name: strategy_name.to_string(),
            initial_cash: config.initial_cash,
            equity_curve: self.equity_curve,
            trade_log: self.trade_log,
            rebalance_dates: self.rebalance_dates,
            total_costs: self.total_costs,
            costs_by_model: self.costs_by_model,
            periods_per_year: config.periods_per_year,
            risk_free_rate: config.risk_free_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::{HoldingCost, LeveragedEtfCost, TransactionCost};
    use crate::strategy::{from_fn, FixedAllocation};
    use market_core::{CalendarAlignment, MarketSeries, RebalanceFrequency, StrategyError};
    use std::sync::Mutex;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn series(symbol: &str, start: u32, closes: &[i64]) -> MarketSeries {
        let closes: Vec<Decimal> = closes.iter().map(|c| dec(*c)).collect();
        MarketSeries::from_closes(symbol, day(start), &closes).unwrap()
    }

    fn data(series: Vec<MarketSeries>) -> MarketData {
        series
            .into_iter()
            .map(|s| (s.symbol().to_string(), s))
            .collect()
    }

    fn engine(config: EngineConfig) -> BacktestEngine {
        BacktestEngine::new(config).unwrap()
    }

    fn daily() -> EngineConfig {
        EngineConfig {
            rebalance: RebalanceFrequency::Daily,
            ..Default::default()
        }
    }

    #[test]
    fn test_buy_and_hold_equity_curve() {
        let market = data(vec![series("SPY", 1, &[100, 105, 95, 110])]);
        let mut strategy = FixedAllocation::buy_and_hold("SPY");

        let result = engine(daily()).run(&mut strategy, &market).unwrap();

        let values: Vec<Decimal> = result.equity_curve.iter().map(|p| p.total_value).collect();
        assert_eq!(values, vec![dec(100000), dec(105000), dec(95000), dec(110000)]);
        // Holdings already match the target after day one
        assert_eq!(result.trade_log.len(), 1);
        assert_eq!(result.trade_log[0].shares_delta, dec(1000));
        assert_eq!(result.rebalance_dates.len(), 4);
    }

    #[test]
    fn test_all_cash_target_stays_flat() {
        let market = data(vec![series("SPY", 1, &[100, 120, 80])]);
        let mut strategy = from_fn("cash", |_| Ok(TargetAllocation::cash()));

        let result = engine(daily()).run(&mut strategy, &market).unwrap();
        assert!(result.trade_log.is_empty());
        assert!(result.equity_curve.iter().all(|p| p.total_value == dec(100000)));
    }

    #[test]
    fn test_strategy_error_aborts_run() {
        let market = data(vec![series("SPY", 1, &[100, 101, 102])]);
        let mut strategy = from_fn("flaky", |ctx| {
            if ctx.date == day(2) {
                Err(StrategyError::new("model diverged"))
            } else {
                Ok(TargetAllocation::single("SPY", dec(50)))
            }
        });

        let err = engine(daily()).run(&mut strategy, &market).unwrap_err();
        match err {
            Error::Strategy { strategy, date, message } => {
                assert_eq!(strategy, "flaky");
                assert_eq!(date, day(2));
                assert_eq!(message, "model diverged");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_allocation_is_fatal() {
        let market = data(vec![series("SPY", 1, &[100, 101])]);
        let mut strategy = FixedAllocation::new("over", TargetAllocation::single("SPY", dec(150)));

        let err = engine(daily()).run(&mut strategy, &market).unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
    }

    #[test]
    fn test_empty_intersection_is_data_unavailable() {
        let market = data(vec![series("A", 1, &[100, 101]), series("B", 10, &[50, 51])]);
        let mut strategy = FixedAllocation::buy_and_hold("A");

        let err = engine(daily()).run(&mut strategy, &market).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { .. }));
    }

    #[test]
    fn test_history_never_includes_future_bars() {
        let market = data(vec![series("SPY", 1, &[100, 101, 102, 103])]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut strategy = from_fn("peek", move |ctx| {
            let last = ctx.history("SPY").last().map(|p| p.date);
            log.lock().unwrap().push((ctx.date, last));
            Ok(TargetAllocation::cash())
        });

        engine(daily()).run(&mut strategy, &market).unwrap();
        for (date, last) in seen.lock().unwrap().iter() {
            assert_eq!(Some(*date), *last);
        }
    }

    #[test]
    fn test_sells_fund_buys_without_margin() {
        let market = data(vec![series("A", 1, &[100, 100]), series("B", 1, &[50, 50])]);
        let mut strategy = from_fn("rotate", |ctx| {
            if ctx.date == day(1) {
                Ok(TargetAllocation::single("A", dec(100)))
            } else {
                Ok(TargetAllocation::single("B", dec(100)))
            }
        });

        let result = engine(daily()).run(&mut strategy, &market).unwrap();
        let day_two: Vec<&Trade> = result.trade_log.iter().filter(|t| t.date == day(2)).collect();

        // Liquidation of A comes before the buy of B
        assert_eq!(day_two.len(), 2);
        assert_eq!(day_two[0].symbol, "A");
        assert_eq!(day_two[0].shares_delta, dec(-1000));
        assert_eq!(day_two[1].symbol, "B");
        assert_eq!(day_two[1].shares_delta, dec(2000));
    }

    #[test]
    fn test_buys_scaled_for_costs_keep_cash_non_negative() {
        let market = data(vec![series("SPY", 1, &[100, 100, 100])]);
        let config = EngineConfig {
            transaction_cost_bps: dec(50),
            ..daily()
        };
        let mut strategy = FixedAllocation::buy_and_hold("SPY");

        let result = engine(config.clone()).run(&mut strategy, &market).unwrap();
        assert!(result.total_costs > Decimal::ZERO);
        assert!(result.trade_log[0].shares_delta < dec(1000));

        // Replay to check cash after the first day
        let engine = engine(config);
        let mut portfolio = Portfolio::new(dec(100000));
        let target = TargetAllocation::single("SPY", dec(100));
        let prices: PriceMap = [("SPY".to_string(), dec(100))].into_iter().collect();
        let decisions = engine.plan_trades(day(1), &target, &portfolio, &prices, dec(100000));
        engine.execute_trades(&mut portfolio, decisions, &prices, day(1));
        assert!(portfolio.cash >= Decimal::ZERO);
    }

    #[test]
    fn test_costs_reduce_final_value() {
        let market = data(vec![series("SPY", 1, &[100, 102, 101, 104, 103])]);
        let free = engine(daily())
            .run(&mut FixedAllocation::buy_and_hold("SPY"), &market)
            .unwrap();
        let costly = engine(daily())
            .with_cost_model(Box::new(TransactionCost::new(dec(25))))
            .run(&mut FixedAllocation::buy_and_hold("SPY"), &market)
            .unwrap();

        assert!(costly.final_value() < free.final_value());
        assert_eq!(costly.costs_by_model.keys().collect::<Vec<_>>(), vec!["transaction"]);
        assert_eq!(costly.total_costs, costly.costs_by_model["transaction"]);
    }

    #[test]
    fn test_holding_costs_charged_between_rebalances() {
        let spy = [100, 101, 99, 102, 104, 103, 105, 106, 104, 107];
        let tqqq = [50, 52, 48, 53, 57, 55, 59, 61, 56, 62];
        let market = data(vec![series("SPY", 1, &spy), series("TQQQ", 1, &tqqq)]);
        let target = TargetAllocation::single("SPY", dec(50)).with("TQQQ", dec(50));

        let holding = HoldingCost::new(Decimal::new(1, 2));
        let leveraged = LeveragedEtfCost::new(Decimal::new(95, 4));
        let result = engine(EngineConfig::default())
            .with_cost_model(Box::new(holding.clone()))
            .with_cost_model(Box::new(leveraged.clone()))
            .run(&mut FixedAllocation::new("split", target), &market)
            .unwrap();

        // Monthly schedule inside one month: a single rebalance on day one
        assert_eq!(result.rebalance_dates, vec![day(1)]);
        assert!(result
            .trade_log
            .iter()
            .all(|t| result.rebalance_dates.contains(&t.date)));

        let mut held = BTreeMap::new();
        for trade in &result.trade_log {
            *held.entry(trade.symbol.clone()).or_insert(Decimal::ZERO) += trade.shares_delta;
        }

        let mut expected_holding = Decimal::ZERO;
        let mut expected_leveraged = Decimal::ZERO;
        for (i, (s, t)) in spy.iter().zip(tqqq.iter()).enumerate() {
            let date = day(i as u32 + 1);
            let marks: PriceMap = [("SPY".to_string(), dec(*s)), ("TQQQ".to_string(), dec(*t))]
                .into_iter()
                .collect();
            expected_holding += holding.calculate(&[], &held, &marks, date);
            expected_leveraged += leveraged.calculate(&[], &held, &marks, date);
        }

        assert_eq!(result.equity_curve.len(), 10);
        assert_eq!(result.costs_by_model["holding"], expected_holding);
        assert_eq!(result.costs_by_model["leveraged_etf"], expected_leveraged);
        assert_eq!(result.total_costs, expected_holding + expected_leveraged);

        // Day one alone would be a tenth of the charge, give or take price moves
        let first_day: PriceMap = [("SPY".to_string(), dec(100)), ("TQQQ".to_string(), dec(50))]
            .into_iter()
            .collect();
        assert!(expected_holding > holding.calculate(&[], &held, &first_day, day(1)) * dec(5));
        // Leveraged drag only applies to the TQQQ leg
        let tqqq_only: BTreeMap<String, Decimal> =
            held.iter().filter(|(s, _)| s.as_str() == "TQQQ").map(|(s, q)| (s.clone(), *q)).collect();
        assert_eq!(
            leveraged.calculate(&[], &held, &first_day, day(1)),
            leveraged.calculate(&[], &tqqq_only, &first_day, day(1))
        );
    }

    #[test]
    fn test_missing_price_skips_symbol_under_union() {
        // B has no bar on day 2
        let mut market = data(vec![series("A", 1, &[100, 100, 100])]);
        let b_points = vec![
            market_core::PricePoint::from_close(day(1), dec(50)).unwrap(),
            market_core::PricePoint::from_close(day(3), dec(50)).unwrap(),
        ];
        market.insert("B".into(), MarketSeries::new("B", b_points).unwrap());

        let config = EngineConfig {
            calendar: CalendarAlignment::Union,
            ..daily()
        };
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let engine = engine(config).with_progress(Arc::new(move |e: &EngineEvent| {
            sink.lock().unwrap().push(e.clone());
        }));

        let target = TargetAllocation::single("A", dec(50)).with("B", dec(50));
        let mut strategy = FixedAllocation::new("split", target);
        let result = engine.run(&mut strategy, &market).unwrap();

        assert_eq!(result.equity_curve.len(), 3);
        assert!(result.trade_log.iter().all(|t| !(t.symbol == "B" && t.date == day(2))));
        // B keeps its day-one mark on day two
        assert_eq!(result.equity_curve[1].total_value, dec(100000));

        let events = events.lock().unwrap();
        let stale_on_day_two = events.iter().any(|e| {
            matches!(e, EngineEvent::DayCompleted { date, stale_symbols, .. }
                if *date == day(2) && stale_symbols == &vec!["B".to_string()])
        });
        assert!(stale_on_day_two);
        assert!(matches!(events.first(), Some(EngineEvent::Started { total_days: 3, .. })));
        assert!(matches!(events.last(), Some(EngineEvent::Finished { .. })));
    }

    #[test]
    fn test_intersect_drops_unshared_dates() {
        let market = data(vec![series("A", 1, &[100, 100, 100, 100]), series("B", 2, &[50, 50, 50])]);
        let mut strategy = FixedAllocation::new(
            "split",
            TargetAllocation::single("A", dec(50)).with("B", dec(50)),
        );

        let result = engine(daily()).run(&mut strategy, &market).unwrap();
        assert_eq!(result.equity_curve.first().map(|p| p.date), Some(day(2)));
        assert_eq!(result.equity_curve.len(), 3);
    }

    #[test]
    fn test_daily_trades_at_least_monthly() {
        let closes: Vec<i64> = (0..60).map(|i| 100 + (i % 7) * 3 - (i % 5) * 2).collect();
        let reversed: Vec<i64> = closes.iter().rev().copied().collect();
        let market = data(vec![series("A", 1, &closes), series("B", 1, &reversed)]);
        let target = TargetAllocation::single("A", dec(60)).with("B", dec(40));

        let daily_result = engine(daily())
            .run(&mut FixedAllocation::new("mix", target.clone()), &market)
            .unwrap();
        let monthly_result = engine(EngineConfig::default())
            .run(&mut FixedAllocation::new("mix", target), &market)
            .unwrap();

        assert!(daily_result.trade_log.len() >= monthly_result.trade_log.len());
        assert_eq!(monthly_result.rebalance_dates.len(), 2);
    }

    #[test]
    fn test_margin_allows_short_and_leverage() {
        let market = data(vec![series("A", 1, &[100, 110]), series("B", 1, &[50, 50])]);
        let config = EngineConfig {
            allow_margin: true,
            max_leverage: dec(2),
            ..daily()
        };
        let target = TargetAllocation::single("A", dec(150)).with("B", dec(-50));
        let mut strategy = FixedAllocation::new("levered", target);

        let result = engine(config).run(&mut strategy, &market).unwrap();
        let first_day: Vec<&Trade> = result.trade_log.iter().filter(|t| t.date == day(1)).collect();
        assert_eq!(first_day.len(), 2);
        // 1500 shares of A rise by 10 each
        assert_eq!(result.equity_curve[1].total_value, dec(115000));
    }
}
