//! Backtester
//!
//! Historical simulation of allocation strategies over daily price data.
//!
//! # Features
//!
//! - **Strategy Trait**: Strategies return target weights; the engine trades
//! - **Backtest Engine**: Daily loop with scheduled rebalancing and calendar alignment
//! - **Cost Models**: Transaction, holding and leveraged-ETF costs, pluggable
//! - **Performance Summary**: Returns, risk ratios, drawdown and tail risk
//! - **Batch Runs**: Parallel trials with cancellation, timeouts and failure isolation
//! - **Monte Carlo**: Seeded bootstrap of historical returns
//!
//! # Example
//!
//! ```ignore
//! use backtester::{BacktestEngine, FixedAllocation};
//! use market_core::{load_market_data, EngineConfig, InMemoryDataSource};
//!
//! let data = load_market_data(&source, &["SPY"], None, None)?;
//! let engine = BacktestEngine::new(EngineConfig::default())?;
//!
//! let mut strategy = FixedAllocation::buy_and_hold("SPY");
//! let result = engine.run(&mut strategy, &data)?;
//! let summary = result.get_performance_summary();
//! println!("Return: {:.2}%", summary.total_return);
//! ```

pub mod batch;
pub mod calendar;
pub mod costs;
pub mod engine;
pub mod monte_carlo;
pub mod result;
pub mod strategy;

// Re-exports
pub use batch::{
    BatchConfig, BatchProgress, BatchProgressCallback, BatchReport, BatchRunner,
    CancellationToken, DistributionStats, SkipCause, TrialFailure,
};
pub use calendar::{trading_calendar, RebalanceSchedule};
pub use costs::{
    cost_models_from_config, CostModel, EraCostSchedule, HoldingCost,
    LeveragedEtfCost, LeveragedInstrumentMatcher, TransactionCost,
};
pub use engine::{BacktestEngine, EngineEvent, ProgressCallback, SkipReason, TradeDecision};
pub use monte_carlo::{bootstrap_scenario, MonteCarloConfig, MonteCarloReport, MonteCarloSimulator};
pub use result::{rank_by_sharpe, BacktestResult, EquityCurvePoint, PerformanceSummary};
pub use strategy::{
    from_fn, FixedAllocation, FnStrategy, HistoryView, Strategy, StrategyContext,
};
