//! Core domain types for the backtesting toolkit.

pub mod allocation;
pub mod market;
pub mod portfolio;
pub mod trade;

pub use allocation::*;
pub use market::*;
pub use portfolio::*;
pub use trade::*;
