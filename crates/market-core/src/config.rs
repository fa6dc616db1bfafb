//! Configuration for backtest runs.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How often the engine queries the strategy and trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RebalanceFrequency {
    /// Every simulated date.
    Daily,
    /// First simulated date of each ISO week.
    Weekly,
    /// First simulated date of each calendar month.
    Monthly,
    /// Every N simulated dates.
    EveryNDays(u32),
}

impl Default for RebalanceFrequency {
    fn default() -> Self {
        RebalanceFrequency::Monthly
    }
}

impl FromStr for RebalanceFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            other => other
                .strip_suffix('d')
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(RebalanceFrequency::EveryNDays)
                .ok_or_else(|| Error::config(format!("unknown rebalance frequency '{}'", s))),
        }
    }
}

impl TryFrom<String> for RebalanceFrequency {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RebalanceFrequency> for String {
    fn from(value: RebalanceFrequency) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Daily => write!(f, "daily"),
            RebalanceFrequency::Weekly => write!(f, "weekly"),
            RebalanceFrequency::Monthly => write!(f, "monthly"),
            RebalanceFrequency::EveryNDays(n) => write!(f, "{}d", n),
        }
    }
}

/// Policy for multi-symbol calendars that do not line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarAlignment {
    /// Simulate only dates on which every symbol has a bar.
    #[default]
    Intersect,
    /// Simulate every date any symbol has a bar. Symbols missing a bar are
    /// not traded that day and are marked at their last known close.
    Union,
}

impl FromStr for CalendarAlignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intersect" => Ok(CalendarAlignment::Intersect),
            "union" => Ok(CalendarAlignment::Union),
            other => Err(Error::config(format!("unknown calendar alignment '{}'", other))),
        }
    }
}

/// Backtest engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting cash balance.
    pub initial_cash: Decimal,
    /// Rebalance schedule.
    pub rebalance: RebalanceFrequency,
    /// Allow short targets and negative cash.
    pub allow_margin: bool,
    /// Gross exposure cap (as a multiple of equity) when margin is allowed.
    pub max_leverage: Decimal,
    /// Share deltas below this size are not traded.
    pub min_trade_shares: Decimal,
    /// Calendar alignment policy for multi-symbol data.
    pub calendar: CalendarAlignment,
    /// Transaction cost in basis points of traded notional.
    pub transaction_cost_bps: Decimal,
    /// Market impact coefficient applied to sqrt(trade notional). Zero disables.
    pub market_impact_factor: Decimal,
    /// Annual custody/holding drag on position value (e.g., 0.001 = 0.1%). Zero disables.
    pub holding_cost_annual_rate: Decimal,
    /// Charge financing and decay costs on leveraged instruments.
    pub leveraged_etf_costs: bool,
    /// Return observations per year used for annualization.
    pub periods_per_year: f64,
    /// Annual risk-free rate used by Sharpe/Sortino (e.g., 0.02 = 2%).
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::new(100000, 0),
            rebalance: RebalanceFrequency::Monthly,
            allow_margin: false,
            max_leverage: Decimal::ONE,
            min_trade_shares: Decimal::new(1, 10), // 1e-10
            calendar: CalendarAlignment::Intersect,
            transaction_cost_bps: Decimal::ZERO,
            market_impact_factor: Decimal::ZERO,
            holding_cost_annual_rate: Decimal::ZERO,
            leveraged_etf_costs: false,
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables (and `.env`).
    ///
    /// Each field reads `BACKTEST_` plus its upper-cased name, the same keys
    /// `from_file` accepts as overrides. Unset variables keep their defaults;
    /// unparseable values are errors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            initial_cash: env_var("BACKTEST_INITIAL_CASH")?.unwrap_or(defaults.initial_cash),
            rebalance: env_var("BACKTEST_REBALANCE")?.unwrap_or(defaults.rebalance),
            allow_margin: env_var("BACKTEST_ALLOW_MARGIN")?.unwrap_or(defaults.allow_margin),
            max_leverage: env_var("BACKTEST_MAX_LEVERAGE")?.unwrap_or(defaults.max_leverage),
            min_trade_shares: env_var("BACKTEST_MIN_TRADE_SHARES")?
                .unwrap_or(defaults.min_trade_shares),
            calendar: env_var("BACKTEST_CALENDAR")?.unwrap_or(defaults.calendar),
            transaction_cost_bps: env_var("BACKTEST_TRANSACTION_COST_BPS")?
                .unwrap_or(defaults.transaction_cost_bps),
            market_impact_factor: env_var("BACKTEST_MARKET_IMPACT_FACTOR")?
                .unwrap_or(defaults.market_impact_factor),
            holding_cost_annual_rate: env_var("BACKTEST_HOLDING_COST_ANNUAL_RATE")?
                .unwrap_or(defaults.holding_cost_annual_rate),
            leveraged_etf_costs: env_var("BACKTEST_LEVERAGED_ETF_COSTS")?
                .unwrap_or(defaults.leveraged_etf_costs),
            periods_per_year: env_var("BACKTEST_PERIODS_PER_YEAR")?
                .unwrap_or(defaults.periods_per_year),
            risk_free_rate: env_var("BACKTEST_RISK_FREE_RATE")?.unwrap_or(defaults.risk_free_rate),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, overridden by `BACKTEST_*` variables.
    ///
    /// Any format the `config` crate recognizes by extension works (TOML,
    /// YAML, JSON).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("BACKTEST").try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.initial_cash <= Decimal::ZERO {
            return Err(Error::config(format!(
                "initial cash must be positive, got {}",
                self.initial_cash
            )));
        }
        if self.max_leverage < Decimal::ONE {
            return Err(Error::config(format!(
                "max leverage must be at least 1, got {}",
                self.max_leverage
            )));
        }
        if self.min_trade_shares < Decimal::ZERO {
            return Err(Error::config("min trade shares cannot be negative"));
        }
        let rates = [
            ("transaction cost bps", self.transaction_cost_bps),
            ("market impact factor", self.market_impact_factor),
            ("holding cost rate", self.holding_cost_annual_rate),
        ];
        if let Some((name, value)) = rates.iter().find(|(_, v)| *v < Decimal::ZERO) {
            return Err(Error::config(format!("{} cannot be negative, got {}", name, value)));
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(Error::config("periods per year must be a positive number"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(Error::config("risk-free rate must be finite"));
        }
        if let RebalanceFrequency::EveryNDays(0) = self.rebalance {
            return Err(Error::config("rebalance interval must be at least one day"));
        }
        Ok(())
    }
}

fn env_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
