//! Parameter validation errors

use rust_decimal::Decimal;
use thiserror::Error;

/// A configured parameter outside its allowed range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} = {value} is out of range: expected {expected}")]
pub struct ParameterError {
    pub field: &'static str,
    pub value: Decimal,
    pub expected: &'static str,
}

impl ParameterError {
    pub fn new(field: &'static str, value: Decimal, expected: &'static str) -> Self {
        Self {
            field,
            value,
            expected,
        }
    }
}

/// Fails with `ParameterError` unless `lo <= value <= hi`
pub fn check_range(
    field: &'static str,
    value: Decimal,
    lo: Decimal,
    hi: Decimal,
    expected: &'static str,
) -> Result<(), ParameterError> {
    if value < lo || value > hi {
        return Err(ParameterError::new(field, value, expected));
    }
    Ok(())
}
