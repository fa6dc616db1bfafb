//! Tax Calculator
//!
//! Tax-lot accounting over a backtest's trade log: FIFO/LIFO lot
//! consumption, short/long-term classification and wash-sale detection.

pub mod calculator;
pub mod error;
pub mod lots;

pub use calculator::{TaxCalculator, TaxSummary, WashSale, LOT_TOLERANCE, WASH_SALE_WINDOW_DAYS};
pub use error::{Result, TaxError};
pub use lots::{CapitalGain, HoldingPeriod, LotMethod, TaxLot, LONG_TERM_DAYS};
