//! Position ledger
//!
//! Owns the pool aggregates and every lender and borrower position. Each
//! mutating operation accrues first, validates against post-accrual figures,
//! then commits; a failed operation leaves the ledger exactly as it was.

use lendpool_core::{Amount, CheckedDecimal, PoolError, ReceiptClass, ReceiptId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::interest::InterestAccrualEngine;
use crate::position::{BorrowerPosition, LenderPosition};
use crate::state::PoolState;
use crate::tx::LedgerTx;

/// Split of a withdrawal between yield and principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub receipt: ReceiptId,
    pub yield_paid: Decimal,
    pub principal_paid: Decimal,
    pub total_deposited: Decimal,
}

impl Withdrawal {
    pub fn total(&self) -> Decimal {
        self.yield_paid.saturating_add(self.principal_paid)
    }
}

/// Outcome of a full repayment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    pub receipt: ReceiptId,
    pub principal_repaid: Decimal,
    pub interest_repaid: Decimal,
    /// Overpayment handed back to the payer
    pub change: Decimal,
    pub collateral_released: Decimal,
}

impl Repayment {
    pub fn debt_repaid(&self) -> Decimal {
        self.principal_repaid.saturating_add(self.interest_repaid)
    }
}

/// Serializable ledger contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub pool: PoolState,
    pub lenders: Vec<LenderPosition>,
    pub borrowers: Vec<BorrowerPosition>,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    pub(crate) pool: PoolState,
    pub(crate) lenders: HashMap<ReceiptId, LenderPosition>,
    pub(crate) borrowers: HashMap<ReceiptId, BorrowerPosition>,
    pub(crate) engine: InterestAccrualEngine,
}

impl PositionLedger {
    pub fn new(engine: InterestAccrualEngine) -> Self {
        Self {
            pool: PoolState::new(),
            lenders: HashMap::new(),
            borrowers: HashMap::new(),
            engine,
        }
    }

    /// Rebuild from a snapshot, applying the current rate model from now on
    pub fn restore(snapshot: LedgerSnapshot, engine: InterestAccrualEngine) -> Self {
        Self {
            pool: snapshot.pool,
            lenders: snapshot
                .lenders
                .into_iter()
                .map(|p| (p.receipt, p))
                .collect(),
            borrowers: snapshot
                .borrowers
                .into_iter()
                .map(|p| (p.receipt, p))
                .collect(),
            engine,
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut lenders: Vec<LenderPosition> = self.lenders.values().cloned().collect();
        lenders.sort_by_key(|p| (p.opened_at, p.receipt.to_string()));
        let mut borrowers: Vec<BorrowerPosition> = self.borrowers.values().cloned().collect();
        borrowers.sort_by_key(|p| (p.opened_at, p.receipt.to_string()));
        LedgerSnapshot {
            pool: self.pool.clone(),
            lenders,
            borrowers,
        }
    }

    pub fn engine(&self) -> &InterestAccrualEngine {
        &self.engine
    }

    /// Open a transaction with the pool accrued to `now`
    pub fn begin(&mut self, now: Timestamp) -> Result<LedgerTx<'_>, PoolError> {
        LedgerTx::begin(self, now)
    }

    // === Operations ===

    /// Credit a lender. Returns the new pool deposit total.
    pub fn deposit(
        &mut self,
        receipt: ReceiptId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let mut tx = self.begin(now)?;
        if tx.has_borrower(&receipt) {
            return Err(PoolError::receipt_mismatch(receipt, ReceiptClass::Lender));
        }

        let total = tx
            .pool()
            .total_deposited
            .try_add(amount.value(), "total deposited")?;
        let position = tx.lender_or_open(receipt)?;
        position.principal_deposited = position
            .principal_deposited
            .try_add(amount.value(), "lender principal")?;
        tx.pool_mut().total_deposited = total;
        tx.commit();

        info!(%receipt, %amount, total_deposited = %total, "deposit");
        Ok(total)
    }

    /// Pay a lender out of pending yield first, then principal.
    ///
    /// Yield is only paid from interest borrowers have actually paid in
    /// (`interest_reserve`); yield that is still owed by borrowers stays
    /// pending and the rest of the request comes out of principal.
    pub fn withdraw(
        &mut self,
        receipt: ReceiptId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Withdrawal, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let requested = amount.value();
        let mut tx = self.begin(now)?;
        let idle_principal = tx.pool().available_liquidity();
        let reserve = tx.pool().interest_reserve;

        let position = tx
            .lender(receipt)?
            .ok_or_else(|| PoolError::receipt_mismatch(receipt, ReceiptClass::Lender))?;
        if requested > position.claim() {
            return Err(PoolError::InsufficientBalance {
                available: position.claim(),
                requested,
            });
        }
        let backed_yield = position.pending_yield.min(reserve);
        let available = backed_yield.saturating_add(position.principal_deposited.min(idle_principal));
        if requested > available {
            return Err(PoolError::InsufficientLiquidity {
                available,
                requested,
            });
        }

        let yield_paid = requested.min(backed_yield);
        let principal_paid = requested - yield_paid;
        position.pending_yield -= yield_paid;
        position.principal_deposited -= principal_paid;

        let pool = tx.pool_mut();
        pool.interest_reserve -= yield_paid;
        pool.total_deposited -= principal_paid;
        let total_deposited = pool.total_deposited;
        tx.commit();

        info!(%receipt, %yield_paid, %principal_paid, "withdraw");
        Ok(Withdrawal {
            receipt,
            yield_paid,
            principal_paid,
            total_deposited,
        })
    }

    /// Repay a borrower's whole debt, releasing all collateral.
    pub fn repay(
        &mut self,
        receipt: ReceiptId,
        payment: Amount,
        now: Timestamp,
    ) -> Result<Repayment, PoolError> {
        let supplied = payment.value();
        let mut tx = self.begin(now)?;

        let position = tx
            .borrower(receipt)?
            .ok_or_else(|| PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower))?;
        let debt = position.debt();
        if debt.is_zero() {
            return Err(PoolError::NothingToRepay(receipt));
        }
        if supplied < debt {
            return Err(PoolError::InsufficientRepayment { debt, supplied });
        }

        let repayment = Repayment {
            receipt,
            principal_repaid: position.principal_borrowed,
            interest_repaid: position.accrued_interest,
            change: supplied - debt,
            collateral_released: position.collateral_posted,
        };
        position.close();

        let pool = tx.pool_mut();
        pool.interest_reserve = pool
            .interest_reserve
            .try_add(repayment.interest_repaid, "interest reserve")?;
        pool.total_borrowed -= repayment.principal_repaid;
        pool.total_collateral -= repayment.collateral_released;
        tx.commit();

        info!(
            %receipt,
            debt_repaid = %repayment.debt_repaid(),
            change = %repayment.change,
            collateral_released = %repayment.collateral_released,
            "repay"
        );
        Ok(repayment)
    }

    /// Top up collateral on an existing borrower position. Returns the new
    /// posted collateral.
    pub fn add_collateral(
        &mut self,
        receipt: ReceiptId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let mut tx = self.begin(now)?;
        let total = tx
            .pool()
            .total_collateral
            .try_add(amount.value(), "total collateral")?;
        let position = tx
            .borrower(receipt)?
            .ok_or_else(|| PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower))?;
        position.collateral_posted = position
            .collateral_posted
            .try_add(amount.value(), "posted collateral")?;
        let posted = position.collateral_posted;

        tx.pool_mut().total_collateral = total;
        tx.commit();

        info!(%receipt, %amount, collateral = %posted, "collateral added");
        Ok(posted)
    }

    // === Read accessors ===
    //
    // Reads accrue on throwaway copies; stored state is not advanced.

    /// Pool aggregates as of `now`
    pub fn pool_at(&self, now: Timestamp) -> Result<PoolState, PoolError> {
        let mut pool = self.pool.clone();
        self.engine.accrue_pool(&mut pool, now)?;
        Ok(pool)
    }

    /// Pool aggregates as last committed
    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    pub fn lender_at(
        &self,
        receipt: &ReceiptId,
        now: Timestamp,
    ) -> Result<Option<LenderPosition>, PoolError> {
        let Some(stored) = self.lenders.get(receipt) else {
            return Ok(None);
        };
        let pool = self.pool_at(now)?;
        let mut position = stored.clone();
        self.engine.accrue_lender(&pool, &mut position)?;
        Ok(Some(position))
    }

    pub fn borrower_at(
        &self,
        receipt: &ReceiptId,
        now: Timestamp,
    ) -> Result<Option<BorrowerPosition>, PoolError> {
        let Some(stored) = self.borrowers.get(receipt) else {
            return Ok(None);
        };
        let pool = self.pool_at(now)?;
        let mut position = stored.clone();
        self.engine.accrue_borrower(&pool, &mut position)?;
        Ok(Some(position))
    }

    /// Current debt on a borrower receipt
    pub fn current_debt(&self, receipt: &ReceiptId, now: Timestamp) -> Result<Option<Decimal>, PoolError> {
        Ok(self.borrower_at(receipt, now)?.map(|p| p.debt()))
    }

    /// Current pending yield on a lender receipt
    pub fn pending_yield(&self, receipt: &ReceiptId, now: Timestamp) -> Result<Option<Decimal>, PoolError> {
        Ok(self.lender_at(receipt, now)?.map(|p| p.pending_yield))
    }

    pub fn lender_count(&self) -> usize {
        self.lenders.len()
    }

    pub fn borrower_count(&self) -> usize {
        self.borrowers.len()
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new(InterestAccrualEngine::default())
    }
}
