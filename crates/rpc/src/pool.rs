//! Lending pool facade
//!
//! Authorizes callers against the receipt registry, then delegates to the
//! ledger and the risk engines. Each committed operation queues a
//! `PoolEvent`; callers drain the queue into the journal.
//!
//! Operations that take an attestation verify it before anything else, so a
//! bad price is reported ahead of any receipt or amount problem.

use lendpool_core::{Amount, PoolError, ReceiptClass, ReceiptId, Timestamp};
use lendpool_events::PoolEvent;
use lendpool_ledger::{
    BorrowerPosition, LedgerSnapshot, LenderPosition, PoolState, PositionLedger, ReceiptRecord,
    ReceiptRegistry, Repayment, Withdrawal,
};
use lendpool_risk::{BorrowOutcome, CollateralRiskEngine, LiquidationEngine, SeizureResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Result of a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub receipt: ReceiptId,
    pub total_deposited: Decimal,
}

/// Current view of one receipt's position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum PositionView {
    Lender(LenderPosition),
    Borrower(BorrowerPosition),
}

/// Everything needed to restore a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub ledger: LedgerSnapshot,
    pub receipts: Vec<ReceiptRecord>,
}

pub struct LendingPool {
    ledger: PositionLedger,
    receipts: ReceiptRegistry,
    risk: CollateralRiskEngine,
    liquidation: LiquidationEngine,
    pending: Vec<PoolEvent>,
}

impl LendingPool {
    pub fn new(ledger: PositionLedger, risk: CollateralRiskEngine, liquidation: LiquidationEngine) -> Self {
        Self {
            ledger,
            receipts: ReceiptRegistry::new(),
            risk,
            liquidation,
            pending: Vec::new(),
        }
    }

    pub fn with_receipts(mut self, receipts: ReceiptRegistry) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            ledger: self.ledger.snapshot(),
            receipts: self.receipts.records(),
        }
    }

    /// Events for operations committed since the last drain
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn receipts(&self) -> &ReceiptRegistry {
        &self.receipts
    }

    // === Operations ===

    /// Deposit as `caller`. Without a receipt a new lender receipt is minted.
    pub fn deposit(
        &mut self,
        caller: &str,
        receipt: Option<ReceiptId>,
        amount: Amount,
        now: Timestamp,
    ) -> Result<DepositOutcome, PoolError> {
        let result = self.deposit_inner(caller, receipt, amount, now);
        self.record(result, "deposit", |outcome| PoolEvent::Deposited {
            receipt: outcome.receipt,
            owner: caller.to_string(),
            amount: amount.value(),
            total_deposited: outcome.total_deposited,
        })
    }

    fn deposit_inner(
        &mut self,
        caller: &str,
        receipt: Option<ReceiptId>,
        amount: Amount,
        now: Timestamp,
    ) -> Result<DepositOutcome, PoolError> {
        let (receipt, minted) = match receipt {
            Some(r) => {
                self.receipts.authorize(r, caller, ReceiptClass::Lender)?;
                (r, false)
            }
            None => (ReceiptId::new(), true),
        };
        let total_deposited = self.ledger.deposit(receipt, amount, now)?;
        if minted {
            self.receipts.register(receipt, caller, ReceiptClass::Lender, now);
        }
        Ok(DepositOutcome {
            receipt,
            total_deposited,
        })
    }

    pub fn withdraw(
        &mut self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Withdrawal, PoolError> {
        let result = self
            .receipts
            .authorize(receipt, caller, ReceiptClass::Lender)
            .map(|_| ())
            .and_then(|_| self.ledger.withdraw(receipt, amount, now));
        self.record(result, "withdraw", |w| PoolEvent::Withdrawn {
            receipt: w.receipt,
            yield_paid: w.yield_paid,
            principal_paid: w.principal_paid,
        })
    }

    /// Borrow as `caller`. Without a receipt a new borrower receipt is minted.
    pub fn borrow(
        &mut self,
        caller: &str,
        receipt: Option<ReceiptId>,
        borrow_amount: Amount,
        collateral_amount: Amount,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<BorrowOutcome, PoolError> {
        let result = self.borrow_inner(caller, receipt, borrow_amount, collateral_amount, raw_attestation, now);
        self.record(result, "borrow", |outcome| PoolEvent::Borrowed {
            receipt: outcome.receipt,
            owner: caller.to_string(),
            amount: outcome.borrowed,
            collateral_added: outcome.collateral_added,
            price: outcome.price,
            health_factor: outcome.health_factor,
        })
    }

    fn borrow_inner(
        &mut self,
        caller: &str,
        receipt: Option<ReceiptId>,
        borrow_amount: Amount,
        collateral_amount: Amount,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<BorrowOutcome, PoolError> {
        let price = self.risk.verify_price(raw_attestation, now)?;
        let (receipt, minted) = match receipt {
            Some(r) => {
                self.receipts.authorize(r, caller, ReceiptClass::Borrower)?;
                (r, false)
            }
            None => (ReceiptId::new(), true),
        };
        let outcome = self.risk.borrow_at(
            &mut self.ledger,
            receipt,
            borrow_amount,
            collateral_amount,
            &price,
            now,
        )?;
        if minted {
            self.receipts.register(receipt, caller, ReceiptClass::Borrower, now);
        }
        Ok(outcome)
    }

    pub fn add_collateral(
        &mut self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        let result = self
            .receipts
            .authorize(receipt, caller, ReceiptClass::Borrower)
            .map(|_| ())
            .and_then(|_| self.ledger.add_collateral(receipt, amount, now));
        self.record(result, "add_collateral", |_| PoolEvent::CollateralAdded {
            receipt,
            amount: amount.value(),
        })
    }

    /// Returns the collateral left posted
    pub fn withdraw_collateral(
        &mut self,
        caller: &str,
        receipt: ReceiptId,
        amount: Amount,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<Decimal, PoolError> {
        let mut price_used = Decimal::ZERO;
        let result = self.risk.verify_price(raw_attestation, now).and_then(|price| {
            price_used = price.price();
            self.receipts.authorize(receipt, caller, ReceiptClass::Borrower)?;
            self.risk
                .withdraw_collateral_at(&mut self.ledger, receipt, amount, &price, now)
        });
        self.record(result, "withdraw_collateral", |_| PoolEvent::CollateralWithdrawn {
            receipt,
            amount: amount.value(),
            price: price_used,
        })
    }

    pub fn repay(
        &mut self,
        caller: &str,
        receipt: ReceiptId,
        payment: Amount,
        now: Timestamp,
    ) -> Result<Repayment, PoolError> {
        let result = self
            .receipts
            .authorize(receipt, caller, ReceiptClass::Borrower)
            .map(|_| ())
            .and_then(|_| self.ledger.repay(receipt, payment, now));
        self.record(result, "repay", |r| PoolEvent::Repaid {
            receipt: r.receipt,
            debt_repaid: r.debt_repaid(),
            change: r.change,
            collateral_released: r.collateral_released,
        })
    }

    /// Anyone may liquidate an unhealthy position
    pub fn liquidate(
        &mut self,
        liquidator: &str,
        receipt: ReceiptId,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<SeizureResult, PoolError> {
        let result = self
            .liquidation
            .liquidate(&mut self.ledger, receipt, raw_attestation, now);
        self.record(result, "liquidate", |s| PoolEvent::Liquidated {
            receipt: s.receipt,
            liquidator: liquidator.to_string(),
            debt_repaid: s.debt_repaid,
            collateral_seized: s.collateral_seized,
            collateral_returned: s.collateral_returned,
            liquidation_fee: s.liquidation_fee,
            bad_debt: s.bad_debt,
            price: s.price,
        })
    }

    /// Hand a receipt, and the position behind it, to `to`
    pub fn transfer_receipt(
        &mut self,
        caller: &str,
        receipt: ReceiptId,
        to: &str,
    ) -> Result<(), PoolError> {
        let class = self
            .receipts
            .get(&receipt)
            .map_or(ReceiptClass::Lender, |r| r.class);
        let result = self.receipts.transfer(receipt, class, caller, to);
        self.record(result, "transfer_receipt", |_| PoolEvent::ReceiptTransferred {
            receipt,
            from: caller.to_string(),
            to: to.to_string(),
        })
    }

    // === Reads ===

    /// Pool aggregates accrued to `now`
    pub fn pool_totals(&self, now: Timestamp) -> Result<PoolState, PoolError> {
        self.ledger.pool_at(now)
    }

    pub fn current_debt(&self, receipt: &ReceiptId, now: Timestamp) -> Result<Option<Decimal>, PoolError> {
        self.ledger.current_debt(receipt, now)
    }

    pub fn pending_yield(&self, receipt: &ReceiptId, now: Timestamp) -> Result<Option<Decimal>, PoolError> {
        self.ledger.pending_yield(receipt, now)
    }

    pub fn position(&self, receipt: &ReceiptId, now: Timestamp) -> Result<Option<PositionView>, PoolError> {
        if let Some(lender) = self.ledger.lender_at(receipt, now)? {
            return Ok(Some(PositionView::Lender(lender)));
        }
        Ok(self.ledger.borrower_at(receipt, now)?.map(PositionView::Borrower))
    }

    /// Health factor of a borrower position at a freshly verified price.
    /// `None` for receipts without a borrower position.
    pub fn health_factor(
        &self,
        receipt: &ReceiptId,
        raw_attestation: &[u8],
        now: Timestamp,
    ) -> Result<Option<Decimal>, PoolError> {
        let price = self.risk.verify_price(raw_attestation, now)?;
        self.risk.position_health(&self.ledger, receipt, &price, now)
    }

    /// Utilization and annual borrow rate as of `now`
    pub fn rates(&self, now: Timestamp) -> Result<(Decimal, Decimal), PoolError> {
        let pool = self.ledger.pool_at(now)?;
        let utilization = pool.utilization();
        Ok((utilization, self.ledger.engine().borrow_rate(utilization)))
    }

    pub fn receipt(&self, receipt: &ReceiptId) -> Option<&ReceiptRecord> {
        self.receipts.get(receipt)
    }

    pub fn receipts_of(&self, owner: &str) -> Vec<ReceiptRecord> {
        self.receipts.owned_by(owner)
    }

    fn record<T>(
        &mut self,
        result: Result<T, PoolError>,
        operation: &'static str,
        event: impl FnOnce(&T) -> PoolEvent,
    ) -> Result<T, PoolError> {
        match result {
            Ok(value) => {
                self.pending.push(event(&value));
                Ok(value)
            }
            Err(err) => {
                warn!(operation, category = err.category(), error = %err, "operation rejected");
                Err(err)
            }
        }
    }
}
