//! Daily OHLCV observations and per-symbol price series.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// All series for a backtest, keyed by symbol.
pub type MarketData = BTreeMap<String, MarketSeries>;

/// Prices for one date, keyed by symbol.
pub type PriceMap = BTreeMap<String, Decimal>;

/// One trading-day OHLCV observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
    /// Split/dividend adjusted close, when the source provides one.
    pub adjusted_close: Option<Decimal>,
}

impl PricePoint {
    /// Create a validated price point.
    ///
    /// Requires all prices > 0 and `low <= {open, close} <= high`.
    pub fn new(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self> {
        let point = Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: None,
        };
        point.validate()?;
        Ok(point)
    }

    /// A bar where open, high, low and close are all the same price.
    pub fn from_close(date: NaiveDate, close: Decimal) -> Result<Self> {
        Self::new(date, close, close, close, close, Decimal::ZERO)
    }

    /// Set the adjusted close.
    pub fn with_adjusted_close(mut self, adjusted_close: Decimal) -> Self {
        self.adjusted_close = Some(adjusted_close);
        self
    }

    /// Check the OHLC ordering invariant.
    pub fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(Error::data_unavailable(
                "",
                format!("non-positive price on {}", self.date),
            ));
        }
        if self.volume < Decimal::ZERO {
            return Err(Error::data_unavailable(
                "",
                format!("negative volume on {}", self.date),
            ));
        }
        let ordered = self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high;
        if !ordered {
            return Err(Error::data_unavailable(
                "",
                format!(
                    "OHLC out of order on {} (o={} h={} l={} c={})",
                    self.date, self.open, self.high, self.low, self.close
                ),
            ));
        }
        Ok(())
    }

    /// Rescale every price by `factor`, keeping date and volume.
    pub fn scaled(&self, factor: Decimal) -> Self {
        Self {
            date: self.date,
            open: self.open * factor,
            high: self.high * factor,
            low: self.low * factor,
            close: self.close * factor,
            volume: self.volume,
            adjusted_close: self.adjusted_close.map(|p| p * factor),
        }
    }
}

/// Ordered price history for one symbol.
///
/// Dates are strictly increasing; calendar gaps (weekends, holidays) are
/// simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct MarketSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

#[derive(Deserialize)]
struct RawSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl TryFrom<RawSeries> for MarketSeries {
    type Error = Error;

    fn try_from(raw: RawSeries) -> Result<Self> {
        MarketSeries::new(raw.symbol, raw.points)
    }
}

impl MarketSeries {
    /// Create a validated series.
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        let symbol = symbol.into();
        if points.is_empty() {
            return Err(Error::data_unavailable(symbol, "series is empty"));
        }
        for point in &points {
            point.validate().map_err(|e| match e {
                Error::DataUnavailable { reason, .. } => {
                    Error::data_unavailable(symbol.clone(), reason)
                }
                other => other,
            })?;
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(Error::data_unavailable(
                symbol,
                format!("dates not strictly increasing at {}", pair[1].date),
            ));
        }
        Ok(Self { symbol, points })
    }

    /// Build a series of flat bars on consecutive calendar days.
    pub fn from_closes(
        symbol: impl Into<String>,
        start: NaiveDate,
        closes: &[Decimal],
    ) -> Result<Self> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, close)| PricePoint::from_close(start + Duration::days(i as i64), *close))
            .collect::<Result<Vec<_>>>()?;
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Bar for an exact date.
    pub fn get(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| &self.points[i])
    }

    /// Closing price on an exact date.
    pub fn close_on(&self, date: NaiveDate) -> Option<Decimal> {
        self.get(date).map(|p| p.close)
    }

    /// Most recent close on or before `date`.
    pub fn last_close_on_or_before(&self, date: NaiveDate) -> Option<Decimal> {
        self.up_to(date).last().map(|p| p.close)
    }

    /// All bars dated on or before `date`.
    pub fn up_to(&self, date: NaiveDate) -> &[PricePoint] {
        let end = self.points.partition_point(|p| p.date <= date);
        &self.points[..end]
    }

    /// Bars within an optional inclusive date range.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> &[PricePoint] {
        let lo = start.map_or(0, |s| self.points.partition_point(|p| p.date < s));
        let hi = end.map_or(self.points.len(), |e| self.points.partition_point(|p| p.date <= e));
        if lo >= hi {
            &[]
        } else {
            &self.points[lo..hi]
        }
    }

    /// Closing prices in date order.
    pub fn closes(&self) -> Vec<Decimal> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Dates in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_price_point_validation() {
        assert!(PricePoint::new(
            day(2),
            Decimal::new(100, 0),
            Decimal::new(105, 0),
            Decimal::new(99, 0),
            Decimal::new(104, 0),
            Decimal::new(1000, 0),
        )
        .is_ok());

        // Close above high
        assert!(PricePoint::new(
            day(2),
            Decimal::new(100, 0),
            Decimal::new(105, 0),
            Decimal::new(99, 0),
            Decimal::new(106, 0),
            Decimal::ZERO,
        )
        .is_err());

        assert!(PricePoint::from_close(day(2), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_series_requires_increasing_dates() {
        let a = PricePoint::from_close(day(3), Decimal::ONE).unwrap();
        let b = PricePoint::from_close(day(2), Decimal::ONE).unwrap();
        let err = MarketSeries::new("SPY", vec![a.clone(), b]).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { ref symbol, .. } if symbol == "SPY"));

        let dup = MarketSeries::new("SPY", vec![a.clone(), a]);
        assert!(dup.is_err());
    }

    #[test]
    fn test_series_empty_is_unavailable() {
        assert!(MarketSeries::new("SPY", vec![]).is_err());
    }

    #[test]
    fn test_series_lookups() {
        let series = MarketSeries::from_closes(
            "SPY",
            day(1),
            &[Decimal::new(100, 0), Decimal::new(101, 0), Decimal::new(102, 0)],
        )
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.close_on(day(2)), Some(Decimal::new(101, 0)));
        assert_eq!(series.close_on(day(9)), None);
        assert_eq!(series.up_to(day(2)).len(), 2);
        assert_eq!(series.up_to(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()).len(), 0);
        assert_eq!(series.last_close_on_or_before(day(20)), Some(Decimal::new(102, 0)));
        assert_eq!(series.between(Some(day(2)), None).len(), 2);
        assert_eq!(series.between(Some(day(3)), Some(day(2))).len(), 0);
    }

    #[test]
    fn test_series_deserialize_validates() {
        let json = r#"{"symbol":"X","points":[
            {"date":"2024-01-02","open":"1","high":"1","low":"1","close":"1","volume":"0","adjusted_close":null},
            {"date":"2024-01-01","open":"1","high":"1","low":"1","close":"1","volume":"0","adjusted_close":null}
        ]}"#;
        assert!(serde_json::from_str::<MarketSeries>(json).is_err());
    }
}
