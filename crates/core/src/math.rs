//! Checked decimal arithmetic
//!
//! `rust_decimal` operators panic on overflow. Pool math on values that come
//! from callers goes through `CheckedDecimal` instead, so an overflow is an
//! ordinary `PoolError::ArithmeticOverflow` and the operation commits nothing.

use rust_decimal::Decimal;

use crate::error::PoolError;

pub trait CheckedDecimal: Sized {
    /// `self + rhs`, naming `quantity` on overflow
    fn try_add(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError>;

    /// `self * rhs`, naming `quantity` on overflow
    fn try_mul(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError>;

    /// `self / rhs`; overflow and division by zero both fail
    fn try_div(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError>;
}

impl CheckedDecimal for Decimal {
    fn try_add(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError> {
        self.checked_add(rhs)
            .ok_or(PoolError::ArithmeticOverflow(quantity))
    }

    fn try_mul(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError> {
        self.checked_mul(rhs)
            .ok_or(PoolError::ArithmeticOverflow(quantity))
    }

    fn try_div(self, rhs: Self, quantity: &'static str) -> Result<Self, PoolError> {
        self.checked_div(rhs)
            .ok_or(PoolError::ArithmeticOverflow(quantity))
    }
}
