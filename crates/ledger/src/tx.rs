//! Ledger transactions
//!
//! Every mutating operation runs on a working copy: the pool aggregates are
//! cloned and accrued to the operation time, and each position the operation
//! touches is cloned and accrued on first access. Nothing reaches the ledger
//! until `commit`; dropping the transaction discards it.

use lendpool_core::{PoolError, ReceiptId, Timestamp};
use std::collections::HashMap;
use tracing::trace;

use crate::ledger::PositionLedger;
use crate::position::{BorrowerPosition, LenderPosition};
use crate::state::PoolState;

pub struct LedgerTx<'a> {
    ledger: &'a mut PositionLedger,
    pool: PoolState,
    lenders: HashMap<ReceiptId, LenderPosition>,
    borrowers: HashMap<ReceiptId, BorrowerPosition>,
    now: Timestamp,
}

impl<'a> LedgerTx<'a> {
    pub(crate) fn begin(ledger: &'a mut PositionLedger, now: Timestamp) -> Result<Self, PoolError> {
        let mut pool = ledger.pool.clone();
        ledger.engine.accrue_pool(&mut pool, now)?;
        Ok(Self {
            ledger,
            pool,
            lenders: HashMap::new(),
            borrowers: HashMap::new(),
            now,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut PoolState {
        &mut self.pool
    }

    pub fn has_lender(&self, receipt: &ReceiptId) -> bool {
        self.lenders.contains_key(receipt) || self.ledger.lenders.contains_key(receipt)
    }

    pub fn has_borrower(&self, receipt: &ReceiptId) -> bool {
        self.borrowers.contains_key(receipt) || self.ledger.borrowers.contains_key(receipt)
    }

    /// Accrued working copy of an existing lender position
    pub fn lender(&mut self, receipt: ReceiptId) -> Result<Option<&mut LenderPosition>, PoolError> {
        if !self.lenders.contains_key(&receipt) {
            let Some(stored) = self.ledger.lenders.get(&receipt) else {
                return Ok(None);
            };
            let mut position = stored.clone();
            self.ledger.engine.accrue_lender(&self.pool, &mut position)?;
            self.lenders.insert(receipt, position);
        }
        Ok(self.lenders.get_mut(&receipt))
    }

    /// Like `lender`, opening a fresh position if none exists
    pub fn lender_or_open(&mut self, receipt: ReceiptId) -> Result<&mut LenderPosition, PoolError> {
        if self.lender(receipt)?.is_none() {
            trace!(%receipt, "opening lender position");
        }
        let (yield_index, now) = (self.pool.yield_index, self.now);
        Ok(self
            .lenders
            .entry(receipt)
            .or_insert_with(|| LenderPosition::new(receipt, yield_index, now)))
    }

    /// Accrued working copy of an existing borrower position
    pub fn borrower(
        &mut self,
        receipt: ReceiptId,
    ) -> Result<Option<&mut BorrowerPosition>, PoolError> {
        if !self.borrowers.contains_key(&receipt) {
            let Some(stored) = self.ledger.borrowers.get(&receipt) else {
                return Ok(None);
            };
            let mut position = stored.clone();
            self.ledger.engine.accrue_borrower(&self.pool, &mut position)?;
            self.borrowers.insert(receipt, position);
        }
        Ok(self.borrowers.get_mut(&receipt))
    }

    /// Like `borrower`, opening a fresh position if none exists
    pub fn borrower_or_open(
        &mut self,
        receipt: ReceiptId,
    ) -> Result<&mut BorrowerPosition, PoolError> {
        if self.borrower(receipt)?.is_none() {
            trace!(%receipt, "opening borrower position");
        }
        let (accumulator, now) = (self.pool.borrow_accumulator, self.now);
        Ok(self
            .borrowers
            .entry(receipt)
            .or_insert_with(|| BorrowerPosition::new(receipt, accumulator, now)))
    }

    /// Write the working copy back to the ledger
    pub fn commit(self) {
        let LedgerTx {
            ledger,
            pool,
            lenders,
            borrowers,
            ..
        } = self;
        ledger.pool = pool;
        ledger.lenders.extend(lenders);
        ledger.borrowers.extend(borrowers);
    }
}
