//! Risk Analytics
//!
//! Stateless risk and performance statistics: volatility, Sharpe, Sortino,
//! drawdown, VaR/CVaR, beta and information ratio.

pub mod risk;
pub mod stats;

pub use risk::{RiskCalculator, TRADING_DAYS_PER_YEAR};
pub use stats::{mean, percentile, sample_std};
