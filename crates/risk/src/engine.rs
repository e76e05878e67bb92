//! Collateral risk engine
//!
//! Admission checks for anything that changes a borrower's debt or collateral.
//! Checks run against post-accrual figures inside a ledger transaction and
//! the transaction only commits when they pass.

use lendpool_core::{Amount, CheckedDecimal, PoolError, ReceiptClass, ReceiptId, Timestamp};
use lendpool_ledger::{BorrowerPosition, PositionLedger};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::gate::{PriceGate, VerifiedPrice};

/// Collateral value over debt. Zero debt has no ratio; it reports `Decimal::MAX`.
pub fn collateral_ratio(debt: Decimal, collateral: Decimal, price: Decimal) -> Result<Decimal, PoolError> {
    if debt.is_zero() {
        return Ok(Decimal::MAX);
    }
    collateral
        .try_mul(price, "collateral value")?
        .try_div(debt, "collateral ratio")
}

/// Result of an admitted borrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowOutcome {
    pub receipt: ReceiptId,
    pub borrowed: Decimal,
    pub collateral_added: Decimal,
    pub debt: Decimal,
    pub collateral_posted: Decimal,
    pub collateral_ratio: Decimal,
    pub health_factor: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct CollateralRiskEngine {
    config: RiskConfig,
    gate: PriceGate,
}

impl CollateralRiskEngine {
    pub fn new(config: RiskConfig, gate: PriceGate) -> Self {
        Self { config, gate }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn gate(&self) -> &PriceGate {
        &self.gate
    }

    /// Verify an attestation for the pool's feed
    pub fn verify_price(&self, raw: &[u8], now: Timestamp) -> Result<VerifiedPrice, PoolError> {
        self.gate.verify(raw, now)
    }

    /// `collateral * price * liquidation_threshold / debt`; `Decimal::MAX`
    /// for a position without debt. Below 1 means liquidatable.
    pub fn health_factor_of(
        &self,
        debt: Decimal,
        collateral: Decimal,
        price: Decimal,
    ) -> Result<Decimal, PoolError> {
        if debt.is_zero() {
            return Ok(Decimal::MAX);
        }
        collateral
            .try_mul(price, "collateral value")?
            .try_mul(self.config.liquidation_threshold, "collateral value")?
            .try_div(debt, "health factor")
    }

    pub fn health_factor(&self, position: &BorrowerPosition, price: Decimal) -> Result<Decimal, PoolError> {
        self.health_factor_of(position.debt(), position.collateral_posted, price)
    }

    /// Would the position's health factor still meet `min_initiation_ratio`
    /// after borrowing `new_borrow` more against `collateral`?
    pub fn can_borrow(
        &self,
        existing_debt: Decimal,
        new_borrow: Decimal,
        collateral: Decimal,
        price: Decimal,
    ) -> Result<(), PoolError> {
        let debt = existing_debt.try_add(new_borrow, "debt")?;
        let health_factor = self.health_factor_of(debt, collateral, price)?;
        if health_factor < self.config.min_initiation_ratio {
            return Err(PoolError::UndercollateralizedBorrow {
                health_factor,
                required: self.config.min_initiation_ratio,
            });
        }
        Ok(())
    }

    /// May `amount` of collateral leave a position with `debt` outstanding?
    pub fn can_withdraw_collateral(
        &self,
        debt: Decimal,
        collateral: Decimal,
        amount: Decimal,
        price: Decimal,
    ) -> Result<(), PoolError> {
        if amount > collateral {
            return Err(PoolError::InsufficientBalance {
                available: collateral,
                requested: amount,
            });
        }
        if debt.is_zero() {
            return Ok(());
        }
        self.can_borrow(debt, Decimal::ZERO, collateral - amount, price)
    }

    /// Verify the attestation, then borrow against posted plus new collateral.
    pub fn borrow(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        borrow_amount: Amount,
        collateral_amount: Amount,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<BorrowOutcome, PoolError> {
        let price = self.verify_price(raw_attestation, now)?;
        self.borrow_at(ledger, receipt, borrow_amount, collateral_amount, &price, now)
    }

    /// Borrow at an already verified price
    pub fn borrow_at(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        borrow_amount: Amount,
        collateral_amount: Amount,
        price: &VerifiedPrice,
        now: Timestamp,
    ) -> Result<BorrowOutcome, PoolError> {
        if borrow_amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let borrow = borrow_amount.value();
        let added = collateral_amount.value();

        let mut tx = ledger.begin(now)?;
        if tx.has_lender(&receipt) {
            return Err(PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower));
        }
        let available = tx.pool().available_liquidity();
        if borrow > available {
            return Err(PoolError::InsufficientLiquidity {
                available,
                requested: borrow,
            });
        }
        // borrow <= available keeps total_borrowed within total_deposited
        let total_borrowed = tx.pool().total_borrowed + borrow;
        let total_collateral = tx
            .pool()
            .total_collateral
            .try_add(added, "total collateral")?;

        let position = tx.borrower_or_open(receipt)?;
        let collateral = position.collateral_posted.try_add(added, "posted collateral")?;
        if let Err(err) = self.can_borrow(position.debt(), borrow, collateral, price.price()) {
            warn!(%receipt, %borrow, %collateral, error = %err, "borrow rejected");
            return Err(err);
        }

        position.principal_borrowed = position.principal_borrowed.try_add(borrow, "principal")?;
        position.collateral_posted = collateral;
        let debt = position.debt();
        let ratio = collateral_ratio(debt, collateral, price.price())?;
        let health_factor = self.health_factor_of(debt, collateral, price.price())?;

        let pool = tx.pool_mut();
        pool.total_borrowed = total_borrowed;
        pool.total_collateral = total_collateral;
        tx.commit();

        let outcome = BorrowOutcome {
            receipt,
            borrowed: borrow,
            collateral_added: added,
            debt,
            collateral_posted: collateral,
            collateral_ratio: ratio,
            health_factor,
            price: price.price(),
        };
        info!(
            %receipt,
            %borrow,
            collateral_added = %added,
            health_factor = %outcome.health_factor,
            "borrow"
        );
        Ok(outcome)
    }

    /// Verify the attestation, then release collateral if the position's
    /// health factor stays at or above `min_initiation_ratio`. Returns the
    /// collateral left posted.
    pub fn withdraw_collateral(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        amount: Amount,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        let price = self.verify_price(raw_attestation, now)?;
        self.withdraw_collateral_at(ledger, receipt, amount, &price, now)
    }

    pub fn withdraw_collateral_at(
        &self,
        ledger: &mut PositionLedger,
        receipt: ReceiptId,
        amount: Amount,
        price: &VerifiedPrice,
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let amount = amount.value();

        let mut tx = ledger.begin(now)?;
        let position = tx
            .borrower(receipt)?
            .ok_or_else(|| PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower))?;
        self.can_withdraw_collateral(
            position.debt(),
            position.collateral_posted,
            amount,
            price.price(),
        )?;

        position.collateral_posted -= amount;
        let remaining = position.collateral_posted;
        tx.pool_mut().total_collateral -= amount;
        tx.commit();

        info!(%receipt, %amount, %remaining, "collateral withdrawn");
        Ok(remaining)
    }

    /// Health factor of a stored position at a verified price
    pub fn position_health(
        &self,
        ledger: &PositionLedger,
        receipt: &ReceiptId,
        price: &VerifiedPrice,
        now: Timestamp,
    ) -> Result<Option<Decimal>, PoolError> {
        ledger
            .borrower_at(receipt, now)?
            .map(|p| self.health_factor(&p, price.price()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Oracle, T0};
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn funded_ledger() -> PositionLedger {
        let mut ledger = PositionLedger::default();
        ledger
            .deposit(ReceiptId::new(), amount(dec!(5000000)), T0)
            .unwrap();
        ledger
    }

    #[test]
    fn test_health_factor() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        assert_eq!(
            engine.health_factor_of(dec!(1000000), dec!(20), dec!(50000)),
            Ok(dec!(0.9))
        );
        assert_eq!(
            engine.health_factor_of(Decimal::ZERO, dec!(1), dec!(1)),
            Ok(Decimal::MAX)
        );
    }

    #[test]
    fn test_can_borrow_threshold() {
        let engine = Oracle::new().risk_engine();
        // 16 * 75,000 * 0.9 / 900,000 = 1.2 exactly
        assert!(engine.can_borrow(Decimal::ZERO, dec!(900000), dec!(16), dec!(75000)).is_ok());
        assert!(matches!(
            engine.can_borrow(Decimal::ZERO, dec!(900000), dec!(15.9), dec!(75000)),
            Err(PoolError::UndercollateralizedBorrow { .. })
        ));
    }

    #[test]
    fn test_admission_uses_health_factor_not_raw_ratio() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let raw = oracle.attest(dec!(50000), T0);

        // Raw ratio 1.25 clears 1.2, but the health factor is only 1.125
        let result = engine.borrow(
            &mut ledger,
            ReceiptId::new(),
            amount(dec!(1000000)),
            amount(dec!(25)),
            &raw,
            T0,
        );
        assert_eq!(
            result,
            Err(PoolError::UndercollateralizedBorrow {
                health_factor: dec!(1.125),
                required: dec!(1.2),
            })
        );
        assert_eq!(ledger.pool().total_borrowed, Decimal::ZERO);

        let outcome = engine
            .borrow(&mut ledger, ReceiptId::new(), amount(dec!(1000000)), amount(dec!(30)), &raw, T0)
            .unwrap();
        assert!(outcome.health_factor >= engine.config().min_initiation_ratio);
    }

    #[test]
    fn test_extreme_amounts_are_typed_errors() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let raw = oracle.attest(dec!(50000), T0);
        let before = ledger.snapshot();

        // 1000 * 50,000 / 1e-28 cannot be represented
        let result = engine.borrow(
            &mut ledger,
            ReceiptId::new(),
            amount(Decimal::new(1, 28)),
            amount(dec!(1000)),
            &raw,
            T0,
        );
        assert!(matches!(result, Err(PoolError::ArithmeticOverflow(_))));

        let result = engine.borrow(
            &mut ledger,
            ReceiptId::new(),
            amount(dec!(1)),
            amount(Decimal::MAX),
            &raw,
            T0,
        );
        assert!(matches!(result, Err(PoolError::ArithmeticOverflow(_))));
        assert_eq!(ledger.snapshot(), before);

        // Still usable afterwards
        assert!(engine
            .borrow(&mut ledger, ReceiptId::new(), amount(dec!(1000)), amount(dec!(1)), &raw, T0)
            .is_ok());
    }

    #[test]
    fn test_borrow_then_second_borrow_undercollateralized() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let receipt = ReceiptId::new();
        let raw = oracle.attest(dec!(75000), T0);

        let outcome = engine
            .borrow(&mut ledger, receipt, amount(dec!(1000000)), amount(dec!(20)), &raw, T0)
            .unwrap();
        assert_eq!(outcome.collateral_ratio, dec!(1.5));
        assert_eq!(outcome.health_factor, dec!(1.35));
        assert_eq!(ledger.pool().total_borrowed, dec!(1000000));
        assert_eq!(ledger.pool().total_collateral, dec!(20));

        let before = ledger.snapshot();
        let second = engine.borrow(
            &mut ledger,
            receipt,
            amount(dec!(300000)),
            Amount::ZERO,
            &raw,
            T0,
        );
        assert!(matches!(second, Err(PoolError::UndercollateralizedBorrow { .. })));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_borrow_with_stale_attestation() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let raw = oracle.attest(dec!(75000), T0 - 3_600);

        let result = engine.borrow(
            &mut ledger,
            ReceiptId::new(),
            amount(dec!(1)),
            amount(dec!(1000)),
            &raw,
            T0,
        );
        assert!(matches!(result, Err(PoolError::StalePrice { .. })));
    }

    #[test]
    fn test_borrow_validation_order() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let raw = oracle.attest(dec!(75000), T0);

        assert_eq!(
            engine.borrow(&mut ledger, ReceiptId::new(), Amount::ZERO, amount(dec!(1)), &raw, T0),
            Err(PoolError::ZeroAmount)
        );

        let lender = ReceiptId::new();
        ledger.deposit(lender, amount(dec!(1)), T0).unwrap();
        assert!(matches!(
            engine.borrow(&mut ledger, lender, amount(dec!(1)), amount(dec!(1)), &raw, T0),
            Err(PoolError::ReceiptMismatch { .. })
        ));

        assert!(matches!(
            engine.borrow(
                &mut ledger,
                ReceiptId::new(),
                amount(dec!(6000000)),
                amount(dec!(1000)),
                &raw,
                T0
            ),
            Err(PoolError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_withdraw_collateral() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let receipt = ReceiptId::new();
        let raw = oracle.attest(dec!(75000), T0);
        engine
            .borrow(&mut ledger, receipt, amount(dec!(900000)), amount(dec!(20)), &raw, T0)
            .unwrap();

        // 16 units at 75,000 leaves a health factor of exactly 1.2
        let remaining = engine
            .withdraw_collateral(&mut ledger, receipt, amount(dec!(4)), &raw, T0)
            .unwrap();
        assert_eq!(remaining, dec!(16));
        assert_eq!(ledger.pool().total_collateral, dec!(16));

        assert!(matches!(
            engine.withdraw_collateral(&mut ledger, receipt, amount(dec!(0.1)), &raw, T0),
            Err(PoolError::UndercollateralizedBorrow { .. })
        ));
        assert!(matches!(
            engine.withdraw_collateral(&mut ledger, receipt, amount(dec!(17)), &raw, T0),
            Err(PoolError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_withdraw_collateral_after_repay() {
        let oracle = Oracle::new();
        let engine = oracle.risk_engine();
        let mut ledger = funded_ledger();
        let receipt = ReceiptId::new();
        let raw = oracle.attest(dec!(75000), T0);
        engine
            .borrow(&mut ledger, receipt, amount(dec!(1000)), amount(dec!(1)), &raw, T0)
            .unwrap();
        ledger.add_collateral(receipt, amount(dec!(1)), T0).unwrap();

        // Without debt any amount up to the posted collateral may leave
        let mut tx = ledger.begin(T0).unwrap();
        tx.borrower(receipt).unwrap().unwrap().principal_borrowed = Decimal::ZERO;
        tx.pool_mut().total_borrowed = Decimal::ZERO;
        tx.commit();

        let remaining = engine
            .withdraw_collateral(&mut ledger, receipt, amount(dec!(2)), &raw, T0)
            .unwrap();
        assert_eq!(remaining, Decimal::ZERO);
    }
}
