//! Tax calculator errors.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxError {
    #[error("cannot sell {requested} {symbol}: only {available} held in open lots")]
    InsufficientLots {
        symbol: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: Decimal },

    #[error("price cannot be negative, got {price}")]
    InvalidPrice { price: Decimal },
}

pub type Result<T> = std::result::Result<T, TaxError>;
