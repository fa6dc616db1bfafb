//! Buy-and-hold versus a 60/40 mix on synthetic prices, with a tax report.
//!
//! Run with: `cargo run --example buy_and_hold`

use chrono::NaiveDate;
use portfolio_backtest::backtester::{
    BacktestEngine, FixedAllocation, MonteCarloConfig, MonteCarloSimulator, Strategy,
};
use portfolio_backtest::market_core::{
    load_market_data, EngineConfig, InMemoryDataSource, MarketSeries, RebalanceFrequency,
    TargetAllocation,
};
use portfolio_backtest::tax_calculator::{LotMethod, TaxCalculator};
use rust_decimal::Decimal;
use tracing::info;

fn synthetic_series(symbol: &str, start: NaiveDate, drift: i64, swing: i64) -> anyhow::Result<MarketSeries> {
    let closes: Vec<Decimal> = (0..500)
        .map(|i| Decimal::new(10_000 + drift * i + swing * ((i % 11) - 5), 2))
        .collect();
    Ok(MarketSeries::from_closes(symbol, start, &closes)?)
}

fn main() -> anyhow::Result<()> {
    portfolio_backtest::init_tracing()?;

    let start = NaiveDate::from_ymd_opt(2020, 1, 1).ok_or_else(|| anyhow::anyhow!("bad start date"))?;
    let source = InMemoryDataSource::new()
        .with_series(synthetic_series("SPY", start, 4, 60)?)
        .with_series(synthetic_series("TLT", start, 1, 15)?);
    let data = load_market_data(&source, &["SPY", "TLT"], None, None)?;

    let mut config = EngineConfig::from_env()?;
    config.rebalance = RebalanceFrequency::Monthly;
    config.transaction_cost_bps = Decimal::new(5, 0);
    let engine = BacktestEngine::new(config)?;

    let mut strategies: Vec<Box<dyn Strategy>> = vec![
        Box::new(FixedAllocation::buy_and_hold("SPY")),
        Box::new(FixedAllocation::new(
            "sixty_forty",
            TargetAllocation::single("SPY", Decimal::new(60, 0)).with("TLT", Decimal::new(40, 0)),
        )),
    ];

    for result in engine.compare_strategies(&mut strategies, &data) {
        let summary = result.get_performance_summary();
        println!(
            "{:<16} return {:>7.2}%  cagr {:>6.2}%  sharpe {:>5.2}  max dd {:>6.2}%  trades {}",
            result.strategy_name,
            summary.total_return,
            summary.annualized_return,
            summary.sharpe_ratio,
            summary.max_drawdown,
            summary.num_trades,
        );

        let taxes = TaxCalculator::from_trade_log(&result.trade_log, LotMethod::Fifo)?.summary();
        println!(
            "{:<16} realized st {}  lt {}  disallowed {}",
            "",
            taxes.net_short_term().round_dp(2),
            taxes.net_long_term().round_dp(2),
            taxes.disallowed_losses.round_dp(2),
        );
    }

    let monte_carlo = MonteCarloSimulator::new(MonteCarloConfig {
        num_simulations: 200,
        ..Default::default()
    });
    let report = monte_carlo.run(&engine, &data, || FixedAllocation::buy_and_hold("SPY"))?;
    if let Some(returns) = &report.total_return {
        info!(
            p5 = returns.p5,
            median = returns.median,
            p95 = returns.p95,
            probability_of_loss = report.probability_of_loss,
            "{}",
            report.status_line()
        );
    }

    Ok(())
}
