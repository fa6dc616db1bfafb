//! Backtest output and derived performance metrics.

use chrono::NaiveDate;
use market_core::{Result, Trade};
use risk_analytics::RiskCalculator;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Portfolio value recorded at the end of one simulated date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub date: NaiveDate,
    pub total_value: Decimal,
}

/// Everything a run produced. Metrics are derived on demand and never
/// stored, so repeated summaries always agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Strategy name.
    pub strategy_name: String,
    /// Starting cash.
    pub initial_cash: Decimal,
    /// One point per simulated date, ascending.
    pub equity_curve: Vec<EquityCurvePoint>,
    /// Executed trades in execution order.
    pub trade_log: Vec<Trade>,
    /// Dates the strategy was queried.
    pub rebalance_dates: Vec<NaiveDate>,
    /// Total costs deducted across all models.
    pub total_costs: Decimal,
    /// Costs deducted per model name.
    pub costs_by_model: BTreeMap<String, Decimal>,
    /// Return observations per year used for annualization.
    pub periods_per_year: f64,
    /// Annual risk-free rate used by Sharpe/Sortino.
    pub risk_free_rate: f64,
}

/// Headline metrics. Percent fields are in percent units; VaR and CVaR are
/// fractions of a unit portfolio.
///
/// The ratio fields serialize non-finite values as the strings `"inf"`,
/// `"-inf"` and `"NaN"` so summaries survive a JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Final value over initial cash, minus one, in percent.
    pub total_return: f64,
    /// Compound annual growth rate in percent.
    pub annualized_return: f64,
    #[serde(with = "non_finite")]
    pub sharpe_ratio: f64,
    /// Infinite when no period lost money.
    #[serde(with = "non_finite")]
    pub sortino_ratio: f64,
    /// Largest peak-to-trough decline in percent.
    pub max_drawdown: f64,
    /// Annualized volatility of daily returns in percent.
    pub volatility: f64,
    /// Share of rebalance intervals with a non-negative return, in percent.
    pub win_rate: f64,
    pub num_trades: usize,
    #[serde(with = "non_finite")]
    pub calmar_ratio: f64,
    /// One-day 95% Value at Risk.
    pub var_95: f64,
    /// One-day 95% Conditional VaR (Expected Shortfall).
    pub cvar_95: f64,
    pub final_value: Decimal,
}

impl BacktestResult {
    /// Value at the last simulated date, or the initial cash for an empty run.
    pub fn final_value(&self) -> Decimal {
        self.equity_curve
            .last()
            .map(|p| p.total_value)
            .unwrap_or(self.initial_cash)
    }

    /// Check if the backtest was profitable.
    pub fn is_profitable(&self) -> bool {
        self.final_value() > self.initial_cash
    }

    /// Equity curve values as floats.
    pub fn values(&self) -> Vec<f64> {
        self.equity_curve
            .iter()
            .map(|p| p.total_value.to_f64().unwrap_or(0.0))
            .collect()
    }

    /// Simple returns between consecutive equity points.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.equity_curve
            .windows(2)
            .map(|w| simple_return(w[0].total_value, w[1].total_value))
            .collect()
    }

    /// Summary using the run's own annualization settings.
    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let calculator = RiskCalculator::with_periods_per_year(self.periods_per_year);
        self.performance_summary_with(&calculator, self.risk_free_rate)
    }

    /// Summary with an explicit calculator and risk-free rate.
    pub fn performance_summary_with(
        &self,
        calculator: &RiskCalculator,
        risk_free_rate: f64,
    ) -> PerformanceSummary {
        let final_value = self.final_value();
        if self.equity_curve.is_empty() {
            return PerformanceSummary {
                total_return: 0.0,
                annualized_return: 0.0,
                sharpe_ratio: 0.0,
                sortino_ratio: 0.0,
                max_drawdown: 0.0,
                volatility: 0.0,
                win_rate: 0.0,
                num_trades: self.trade_log.len(),
                calmar_ratio: 0.0,
                var_95: 0.0,
                cvar_95: 0.0,
                final_value,
            };
        }

        // Total return stays in decimal arithmetic until the last step
        let total_return = if self.initial_cash.is_zero() {
            0.0
        } else {
            ((final_value / self.initial_cash - Decimal::ONE) * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };

        let returns = self.daily_returns();
        let values = self.values();

        let annualized_return = RiskCalculator::annualized_return(total_return, self.years());
        let max_drawdown = RiskCalculator::max_drawdown(&values);

        PerformanceSummary {
            total_return,
            annualized_return,
            sharpe_ratio: calculator.sharpe_ratio(&returns, risk_free_rate),
            sortino_ratio: calculator.sortino_ratio(&returns, risk_free_rate),
            max_drawdown,
            volatility: calculator.volatility(&returns, true) * 100.0,
            win_rate: self.win_rate(),
            num_trades: self.trade_log.len(),
            calmar_ratio: RiskCalculator::calmar_ratio(annualized_return, max_drawdown),
            var_95: RiskCalculator::value_at_risk(&returns, 0.95, 1.0),
            cvar_95: RiskCalculator::conditional_var(&returns, 0.95, 1.0),
            final_value,
        }
    }

    /// Calendar years spanned by the equity curve.
    pub fn years(&self) -> f64 {
        match (self.equity_curve.first(), self.equity_curve.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days() as f64 / 365.25,
            _ => 0.0,
        }
    }

    /// Percent of rebalance intervals that did not lose money.
    ///
    /// Intervals run between consecutive rebalance dates, with the final
    /// equity point closing the last one.
    pub fn win_rate(&self) -> f64 {
        let mut checkpoints: Vec<Decimal> = self
            .equity_curve
            .iter()
            .filter(|p| self.rebalance_dates.binary_search(&p.date).is_ok())
            .map(|p| p.total_value)
            .collect();

        if let Some(last) = self.equity_curve.last() {
            let last_is_checkpoint = self.rebalance_dates.last() == Some(&last.date);
            if !last_is_checkpoint {
                checkpoints.push(last.total_value);
            }
        }

        let intervals: Vec<bool> = checkpoints
            .windows(2)
            .map(|w| w[1] >= w[0])
            .collect();
        if intervals.is_empty() {
            return 0.0;
        }

        let wins = intervals.iter().filter(|won| **won).count();
        wins as f64 / intervals.len() as f64 * 100.0
    }

    /// Serialize the full result.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sort results best-first by Sharpe ratio.
pub fn rank_by_sharpe(mut results: Vec<BacktestResult>) -> Vec<BacktestResult> {
    results.sort_by(|a, b| {
        let a = a.get_performance_summary().sharpe_ratio;
        let b = b.get_performance_summary().sharpe_ratio;
        b.total_cmp(&a)
    });
    results
}

fn simple_return(prev: Decimal, curr: Decimal) -> f64 {
    if prev.is_zero() {
        0.0
    } else {
        ((curr - prev) / prev).to_f64().unwrap_or(0.0)
    }
}

/// Serde adapter writing non-finite floats as strings, since JSON has no
/// literal for them.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!("invalid ratio '{}'", other))),
            },
        }
    }
}
