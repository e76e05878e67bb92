//! Lender and borrower positions

use lendpool_core::{ReceiptId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A lender's claim on the pool.
///
/// Never removed once created; a position with no principal and no pending
/// yield is inert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderPosition {
    pub receipt: ReceiptId,
    pub principal_deposited: Decimal,
    /// Pool yield index when this position was last touched
    pub accrual_snapshot: Decimal,
    pub pending_yield: Decimal,
    pub opened_at: Timestamp,
}

impl LenderPosition {
    pub fn new(receipt: ReceiptId, yield_index: Decimal, opened_at: Timestamp) -> Self {
        Self {
            receipt,
            principal_deposited: Decimal::ZERO,
            accrual_snapshot: yield_index,
            pending_yield: Decimal::ZERO,
            opened_at,
        }
    }

    /// Everything the lender could withdraw: principal plus yield
    pub fn claim(&self) -> Decimal {
        self.principal_deposited.saturating_add(self.pending_yield)
    }

    pub fn is_inert(&self) -> bool {
        self.claim().is_zero()
    }
}

/// A borrower's debt and the collateral backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerPosition {
    pub receipt: ReceiptId,
    pub principal_borrowed: Decimal,
    pub accrued_interest: Decimal,
    pub collateral_posted: Decimal,
    /// Pool borrow accumulator when this position was last touched
    pub debt_accrual_snapshot: Decimal,
    pub opened_at: Timestamp,
}

impl BorrowerPosition {
    pub fn new(receipt: ReceiptId, borrow_accumulator: Decimal, opened_at: Timestamp) -> Self {
        Self {
            receipt,
            principal_borrowed: Decimal::ZERO,
            accrued_interest: Decimal::ZERO,
            collateral_posted: Decimal::ZERO,
            debt_accrual_snapshot: borrow_accumulator,
            opened_at,
        }
    }

    /// Principal plus materialized interest. Saturates, so a debt too large
    /// to represent still reads as unhealthy.
    pub fn debt(&self) -> Decimal {
        self.principal_borrowed.saturating_add(self.accrued_interest)
    }

    pub fn has_debt(&self) -> bool {
        !self.debt().is_zero()
    }

    /// Settle `amount` of debt, interest first. Returns the principal part.
    pub fn settle(&mut self, amount: Decimal) -> Decimal {
        let amount = amount.min(self.debt());
        let interest = amount.min(self.accrued_interest);
        let principal = amount - interest;
        self.accrued_interest -= interest;
        self.principal_borrowed -= principal;
        principal
    }

    /// Zero debt and collateral; the position stays on record
    pub fn close(&mut self) {
        self.principal_borrowed = Decimal::ZERO;
        self.accrued_interest = Decimal::ZERO;
        self.collateral_posted = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lender_claim() {
        let mut lender = LenderPosition::new(ReceiptId::new(), dec!(0.01), 10);
        assert!(lender.is_inert());
        lender.principal_deposited = dec!(100);
        lender.pending_yield = dec!(2.5);
        assert_eq!(lender.claim(), dec!(102.5));
    }

    #[test]
    fn test_settle_pays_interest_first() {
        let mut pos = BorrowerPosition::new(ReceiptId::new(), Decimal::ZERO, 0);
        pos.principal_borrowed = dec!(1000);
        pos.accrued_interest = dec!(50);

        let principal = pos.settle(dec!(80));
        assert_eq!(principal, dec!(30));
        assert_eq!(pos.accrued_interest, Decimal::ZERO);
        assert_eq!(pos.principal_borrowed, dec!(970));

        // Settling more than the debt is clamped
        let principal = pos.settle(dec!(5000));
        assert_eq!(principal, dec!(970));
        assert!(!pos.has_debt());
    }

    #[test]
    fn test_close_keeps_receipt() {
        let receipt = ReceiptId::new();
        let mut pos = BorrowerPosition::new(receipt, Decimal::ZERO, 0);
        pos.principal_borrowed = dec!(1);
        pos.collateral_posted = dec!(2);
        pos.close();
        assert_eq!(pos.receipt, receipt);
        assert!(!pos.has_debt());
        assert_eq!(pos.collateral_posted, Decimal::ZERO);
    }
}
