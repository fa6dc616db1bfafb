//! Market data sources consumed by the engine.
//!
//! Loading happens before a run starts; nothing here is called from inside
//! the simulation loop.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::types::{MarketData, MarketSeries};
use crate::{Error, Result};

/// Supplier of validated, ascending-date price series.
#[cfg_attr(test, mockall::automock)]
pub trait MarketDataSource {
    /// Load one symbol, optionally bounded to an inclusive date range.
    ///
    /// Fails with [`Error::DataUnavailable`] when the symbol is unknown or
    /// the range holds no bars.
    fn load(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<MarketSeries>;
}

/// Load every symbol into a [`MarketData`] map.
///
/// The first unavailable symbol aborts the whole load; nothing is retried.
pub fn load_market_data<S: MarketDataSource + ?Sized>(
    source: &S,
    symbols: &[&str],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<MarketData> {
    let mut data = MarketData::new();
    for symbol in symbols {
        let series = source.load(symbol, start, end)?;
        debug!(symbol = %symbol, bars = series.len(), "Loaded price series");
        data.insert(symbol.to_string(), series);
    }
    info!(symbols = data.len(), "Market data loaded");
    Ok(data)
}

/// Data source over series already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    series: HashMap<String, MarketSeries>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a series.
    pub fn insert(&mut self, series: MarketSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    /// Add a series, builder style.
    pub fn with_series(mut self, series: MarketSeries) -> Self {
        self.insert(series);
        self
    }

    /// Symbols available, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl MarketDataSource for InMemoryDataSource {
    fn load(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<MarketSeries> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| Error::data_unavailable(symbol, "unknown symbol"))?;

        let points = series.between(start, end);
        if points.is_empty() {
            return Err(Error::data_unavailable(
                symbol,
                format!("no bars between {:?} and {:?}", start, end),
            ));
        }
        MarketSeries::new(symbol, points.to_vec())
    }
}
