//! Error types for the backtesting toolkit.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Strategy '{strategy}' failed on {date}: {message}")]
    Strategy {
        strategy: String,
        date: NaiveDate,
        message: String,
    },

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }
}

/// A target allocation that failed validation.
///
/// Never auto-corrected: clamping would hide strategy bugs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("negative weight {weight}% for {symbol} while shorting is disabled")]
    NegativeWeight { symbol: String, weight: Decimal },

    #[error("weights sum to {total}% which exceeds 100% without margin")]
    OverAllocated { total: Decimal },

    #[error("gross exposure {gross}% exceeds the {limit}% leverage limit")]
    ExceedsLeverage { gross: Decimal, limit: Decimal },
}

/// Failure reported by a strategy for a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
