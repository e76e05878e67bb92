//! Pool aggregates

use lendpool_core::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pool-wide totals and accrual indexes.
///
/// `total_deposited` and `total_borrowed` count principal only; interest lives
/// in the indexes until a position is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub total_deposited: Decimal,
    pub total_borrowed: Decimal,
    pub total_collateral: Decimal,
    /// Lender share of all interest accrued so far
    pub cumulative_interest_yield: Decimal,
    pub protocol_fee_accrued: Decimal,
    /// Sum of `rate * dt / year` over the life of the pool
    pub borrow_accumulator: Decimal,
    /// Lender yield per unit of deposited principal
    pub yield_index: Decimal,
    pub last_accrual: Timestamp,
    /// Debt written off by liquidations that ran out of collateral
    pub bad_debt: Decimal,
    /// Interest collected from borrowers and not yet paid out as yield.
    /// Lender yield is only paid from here.
    #[serde(default)]
    pub interest_reserve: Decimal,
}

impl PoolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposited principal that is not lent out
    pub fn available_liquidity(&self) -> Decimal {
        (self.total_deposited - self.total_borrowed).max(Decimal::ZERO)
    }

    /// `total_borrowed / total_deposited`, 0 for an empty pool, capped at 1
    pub fn utilization(&self) -> Decimal {
        if self.total_deposited.is_zero() {
            return Decimal::ZERO;
        }
        // Only a ratio above 1 can overflow
        self.total_borrowed
            .checked_div(self.total_deposited)
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE)
    }
}
