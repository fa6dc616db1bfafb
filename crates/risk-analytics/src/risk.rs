//! Risk and performance metrics over return and value series.
//!
//! Every method is a pure function of its inputs. Degenerate inputs (too few
//! observations, zero variance, mismatched lengths) return `0.0` instead of
//! failing, so a single short or flat series never aborts a report.

use serde::{Deserialize, Serialize};

use crate::stats::{mean, percentile, sample_std};

/// Default number of return observations per year (trading days).
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Stateless calculator parameterized only by the sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCalculator {
    /// Observations per year used for annualization (252 daily, 12 monthly).
    pub periods_per_year: f64,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl RiskCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculator for a different sampling frequency.
    pub fn with_periods_per_year(periods_per_year: f64) -> Self {
        Self { periods_per_year }
    }

    /// Simple period returns from a value series.
    ///
    /// A zero previous value yields a zero return for that step.
    pub fn returns_from_values(values: &[f64]) -> Vec<f64> {
        values
            .windows(2)
            .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
            .collect()
    }

    /// Sample standard deviation (n - 1), optionally annualized.
    pub fn volatility(&self, returns: &[f64], annualize: bool) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let std = sample_std(returns);
        if annualize {
            std * self.periods_per_year.sqrt()
        } else {
            std
        }
    }

    /// Annualized excess return over annualized volatility.
    pub fn sharpe_ratio(&self, returns: &[f64], risk_free_rate: f64) -> f64 {
        let vol = self.volatility(returns, true);
        if vol == 0.0 {
            return 0.0;
        }
        (mean(returns) * self.periods_per_year - risk_free_rate) / vol
    }

    /// Annualized standard deviation of the negative returns only.
    pub fn downside_deviation(&self, returns: &[f64]) -> f64 {
        let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        self.volatility(&negatives, true)
    }

    /// Sharpe variant penalizing only downside volatility.
    ///
    /// `+inf` when no return is negative.
    pub fn sortino_ratio(&self, returns: &[f64], risk_free_rate: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        if !returns.iter().any(|r| *r < 0.0) {
            return f64::INFINITY;
        }
        let downside = self.downside_deviation(returns);
        if downside == 0.0 {
            return 0.0;
        }
        (mean(returns) * self.periods_per_year - risk_free_rate) / downside
    }

    /// Largest peak-to-trough decline, as a positive percentage.
    pub fn max_drawdown(values: &[f64]) -> f64 {
        let mut peak = match values.first() {
            Some(v) => *v,
            None => return 0.0,
        };
        let mut max_drawdown: f64 = 0.0;

        for value in values {
            if *value > peak {
                peak = *value;
            }
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - value) / peak);
            }
        }

        max_drawdown * 100.0
    }

    /// Historical Value at Risk.
    ///
    /// Loss at the `(1 - confidence)` lower-tail percentile (type 7), scaled
    /// by `portfolio_value`. Negative when even the tail is a gain.
    pub fn value_at_risk(returns: &[f64], confidence_level: f64, portfolio_value: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let threshold = percentile(returns, (1.0 - confidence_level) * 100.0);
        -threshold * portfolio_value
    }

    /// Conditional VaR: mean loss of the returns at or beyond the VaR threshold.
    pub fn conditional_var(returns: &[f64], confidence_level: f64, portfolio_value: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let threshold = percentile(returns, (1.0 - confidence_level) * 100.0);
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
        if tail.is_empty() {
            return -threshold * portfolio_value;
        }
        -mean(&tail) * portfolio_value
    }

    /// `Cov(asset, market) / Var(market)`.
    pub fn beta(asset_returns: &[f64], market_returns: &[f64]) -> f64 {
        if asset_returns.len() != market_returns.len() || asset_returns.len() < 2 {
            return 0.0;
        }
        let asset_mean = mean(asset_returns);
        let market_mean = mean(market_returns);
        let n = asset_returns.len() as f64;

        let covariance = asset_returns
            .iter()
            .zip(market_returns)
            .map(|(a, m)| (a - asset_mean) * (m - market_mean))
            .sum::<f64>()
            / (n - 1.0);
        let market_variance = market_returns
            .iter()
            .map(|m| (m - market_mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);

        if market_variance == 0.0 {
            0.0
        } else {
            covariance / market_variance
        }
    }

    /// Mean active return over its standard deviation.
    pub fn information_ratio(portfolio_returns: &[f64], benchmark_returns: &[f64]) -> f64 {
        if portfolio_returns.len() != benchmark_returns.len() || portfolio_returns.len() < 2 {
            return 0.0;
        }
        let active: Vec<f64> = portfolio_returns
            .iter()
            .zip(benchmark_returns)
            .map(|(p, b)| p - b)
            .collect();
        let tracking_error = sample_std(&active);
        if tracking_error == 0.0 {
            0.0
        } else {
            mean(&active) / tracking_error
        }
    }

    /// Compound annual growth rate, as a percentage.
    ///
    /// `total_return_pct` is the whole-period return in percent; `years` the
    /// elapsed time.
    pub fn annualized_return(total_return_pct: f64, years: f64) -> f64 {
        if years <= 0.0 {
            return 0.0;
        }
        let growth = 1.0 + total_return_pct / 100.0;
        if growth <= 0.0 {
            return -100.0;
        }
        (growth.powf(1.0 / years) - 1.0) * 100.0
    }

    /// Annualized return over max drawdown (both in percent).
    pub fn calmar_ratio(annualized_return_pct: f64, max_drawdown_pct: f64) -> f64 {
        if max_drawdown_pct > 0.0 {
            annualized_return_pct / max_drawdown_pct
        } else if annualized_return_pct > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}
