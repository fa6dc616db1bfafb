//! Portfolio Backtest
//!
//! Historical backtesting and portfolio simulation. This crate re-exports the
//! workspace crates under one roof:
//!
//! - [`market_core`]: price data, portfolio state, configuration and errors
//! - [`risk_analytics`]: risk and performance metrics
//! - [`backtester`]: strategies, cost models, the engine and batch runs
//! - [`tax_calculator`]: tax-lot accounting over a trade log

pub use backtester;
pub use market_core;
pub use risk_analytics;
pub use tax_calculator;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "backtester=info,market_core=info,tax_calculator=info";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`; falls back to [`DEFAULT_LOG_FILTER`]. Fails when a
/// global subscriber is already installed, leaving that one in place.
pub fn init_tracing() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
