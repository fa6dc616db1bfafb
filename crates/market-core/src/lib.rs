//! Market Core Library
//!
//! Shared market data, portfolio, allocation and configuration types for the
//! backtesting toolkit.

pub mod config;
pub mod data_source;
pub mod error;
pub mod types;

pub use config::{CalendarAlignment, EngineConfig, RebalanceFrequency};
pub use data_source::{load_market_data, InMemoryDataSource, MarketDataSource};
pub use error::{AllocationError, Error, Result, StrategyError};
pub use types::{
    MarketData, MarketSeries, Portfolio, PriceMap, PricePoint, TargetAllocation, Trade, TradeSide,
};
