//! Monte Carlo robustness testing by bootstrapping historical returns.
//!
//! Each scenario resamples whole days of returns (the same day across every
//! symbol, preserving cross-asset correlation) and replays a strategy over
//! the synthetic prices. Scenario `i` is seeded with `seed + i`, so a batch
//! is reproducible regardless of thread scheduling.

use market_core::{CalendarAlignment, Error, MarketData, MarketSeries, PricePoint, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::batch::{BatchReport, BatchRunner, DistributionStats};
use crate::calendar::trading_calendar;
use crate::engine::BacktestEngine;
use crate::strategy::Strategy;

/// Decimal places kept on synthetic closes.
const PRICE_DP: u32 = 8;

/// Monte Carlo settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of synthetic scenarios.
    pub num_simulations: usize,
    /// Base seed; scenario `i` uses `seed + i`.
    pub seed: u64,
    /// Scenario length in days. `None` keeps the historical length.
    pub horizon: Option<usize>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            seed: 42,
            horizon: None,
        }
    }
}

/// Distribution of outcomes across scenarios.
#[derive(Debug, Clone)]
pub struct MonteCarloReport {
    pub batch: BatchReport,
    /// Total return (percent) across successful scenarios.
    pub total_return: Option<DistributionStats>,
    /// Max drawdown (percent) across successful scenarios.
    pub max_drawdown: Option<DistributionStats>,
    /// Sharpe ratio across successful scenarios.
    pub sharpe_ratio: Option<DistributionStats>,
    /// Share of successful scenarios that lost money, in percent.
    pub probability_of_loss: f64,
}

impl MonteCarloReport {
    pub fn status_line(&self) -> String {
        self.batch.status_line()
    }
}

/// Replays a strategy over bootstrapped price paths.
#[derive(Clone, Default)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
    runner: BatchRunner,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self {
            config,
            runner: BatchRunner::default(),
        }
    }

    /// Use a configured batch runner (threads, timeout, cancellation).
    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Run every scenario with a fresh strategy from `make_strategy`.
    pub fn run<S, F>(
        &self,
        engine: &BacktestEngine,
        market_data: &MarketData,
        make_strategy: F,
    ) -> Result<MonteCarloReport>
    where
        S: Strategy,
        F: Fn() -> S + Sync + Send,
    {
        let returns = DailyReturns::from_market_data(market_data)?;
        info!(
            simulations = self.config.num_simulations,
            seed = self.config.seed,
            days = returns.dates.len(),
            "Starting Monte Carlo simulation"
        );

        let batch = self.runner.run(self.config.num_simulations, |trial| {
            let seed = self.config.seed.wrapping_add(trial as u64);
            let scenario = returns.bootstrap(seed, self.config.horizon)?;
            let mut strategy = make_strategy();
            engine.run(&mut strategy, &scenario)
        })?;

        let summaries: Vec<_> = batch
            .results
            .iter()
            .map(|(_, r)| r.get_performance_summary())
            .collect();
        let total_returns: Vec<f64> = summaries.iter().map(|s| s.total_return).collect();
        let drawdowns: Vec<f64> = summaries.iter().map(|s| s.max_drawdown).collect();
        let sharpes: Vec<f64> = summaries.iter().map(|s| s.sharpe_ratio).collect();

        let probability_of_loss = if total_returns.is_empty() {
            0.0
        } else {
            total_returns.iter().filter(|r| **r < 0.0).count() as f64 / total_returns.len() as f64
                * 100.0
        };

        let report = MonteCarloReport {
            total_return: DistributionStats::from_values(&total_returns),
            max_drawdown: DistributionStats::from_values(&drawdowns),
            sharpe_ratio: DistributionStats::from_values(&sharpes),
            probability_of_loss,
            batch,
        };

        info!(
            probability_of_loss = report.probability_of_loss,
            median_return = report.total_return.as_ref().map(|s| s.median),
            "{}",
            report.status_line()
        );
        Ok(report)
    }
}

/// Generate one bootstrapped scenario from historical data.
pub fn bootstrap_scenario(market_data: &MarketData, seed: u64, horizon: Option<usize>) -> Result<MarketData> {
    DailyReturns::from_market_data(market_data)?.bootstrap(seed, horizon)
}

/// Every symbol's bars aligned on the shared calendar.
struct DailyReturns<'a> {
    dates: Vec<chrono::NaiveDate>,
    /// Bars per symbol on the shared dates.
    bars: Vec<(&'a str, Vec<&'a PricePoint>)>,
}

impl<'a> DailyReturns<'a> {
    fn from_market_data(market_data: &'a MarketData) -> Result<Self> {
        let dates = trading_calendar(market_data, CalendarAlignment::Intersect);
        if dates.len() < 2 {
            return Err(Error::data_unavailable(
                market_data.keys().cloned().collect::<Vec<_>>().join(","),
                "bootstrapping needs at least two shared dates",
            ));
        }

        let bars = market_data
            .iter()
            .map(|(symbol, series)| {
                let points = dates.iter().filter_map(|d| series.get(*d)).collect();
                (symbol.as_str(), points)
            })
            .collect();

        Ok(Self { dates, bars })
    }

    /// Sample `horizon - 1` whole days of returns with replacement.
    fn bootstrap(&self, seed: u64, horizon: Option<usize>) -> Result<MarketData> {
        let days = horizon.unwrap_or(self.dates.len()).clamp(2, self.dates.len());
        let mut rng = StdRng::seed_from_u64(seed);

        // Index of the source day whose return drives each synthetic step
        let draws: Vec<usize> = (1..days).map(|_| rng.gen_range(1..self.dates.len())).collect();

        let mut scenario = MarketData::new();
        for (symbol, bars) in &self.bars {
            let mut points = Vec::with_capacity(days);
            let mut close = bars[0].close;
            points.push(bars[0].clone());

            for (step, source) in draws.iter().copied().enumerate() {
                let (prev, bar) = (bars[source - 1], bars[source]);
                let target_close = (close * bar.close / prev.close).round_dp(PRICE_DP);

                // Scaling the whole bar keeps open/high/low consistent with the close
                let mut synthetic = bar.scaled(target_close / bar.close);
                synthetic.date = self.dates[step + 1];
                close = synthetic.close;
                points.push(synthetic);
            }

            scenario.insert(symbol.to_string(), MarketSeries::new(*symbol, points)?);
        }
        Ok(scenario)
    }
}
