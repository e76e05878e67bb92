//! Receipt registry
//!
//! Maps receipt ids to their owner and class. The ledger itself only knows
//! receipt ids; ownership checks and transfers happen here, in front of it.

use lendpool_core::{PoolError, ReceiptClass, ReceiptId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub receipt: ReceiptId,
    pub owner: String,
    pub class: ReceiptClass,
    pub minted_at: Timestamp,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptRegistry {
    records: HashMap<ReceiptId, ReceiptRecord>,
}

impl ReceiptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ReceiptRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.receipt, r)).collect(),
        }
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<ReceiptRecord> {
        let mut records: Vec<ReceiptRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| (r.minted_at, r.receipt.to_string()));
        records
    }

    /// Record a receipt id chosen by the caller
    pub fn register(&mut self, receipt: ReceiptId, owner: &str, class: ReceiptClass, now: Timestamp) {
        info!(%receipt, owner, %class, "receipt minted");
        self.records.insert(
            receipt,
            ReceiptRecord {
                receipt,
                owner: owner.to_string(),
                class,
                minted_at: now,
            },
        );
    }

    /// Check that `caller` holds `receipt` and that it is of `class`
    pub fn authorize(
        &self,
        receipt: ReceiptId,
        caller: &str,
        class: ReceiptClass,
    ) -> Result<&ReceiptRecord, PoolError> {
        match self.records.get(&receipt) {
            Some(record) if record.owner == caller && record.class == class => Ok(record),
            _ => Err(PoolError::receipt_mismatch(receipt, class)),
        }
    }

    /// Hand a receipt, and the position behind it, to a new owner
    pub fn transfer(
        &mut self,
        receipt: ReceiptId,
        class: ReceiptClass,
        from: &str,
        to: &str,
    ) -> Result<(), PoolError> {
        self.authorize(receipt, from, class)?;
        if let Some(record) = self.records.get_mut(&receipt) {
            record.owner = to.to_string();
        }
        info!(%receipt, from, to, "receipt transferred");
        Ok(())
    }

    pub fn get(&self, receipt: &ReceiptId) -> Option<&ReceiptRecord> {
        self.records.get(receipt)
    }

    pub fn owned_by(&self, owner: &str) -> Vec<ReceiptRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &mut ReceiptRegistry, owner: &str, class: ReceiptClass, now: Timestamp) -> ReceiptId {
        let receipt = ReceiptId::new();
        registry.register(receipt, owner, class, now);
        receipt
    }

    #[test]
    fn test_register_and_authorize() {
        let mut registry = ReceiptRegistry::new();
        let receipt = registered(&mut registry, "alice", ReceiptClass::Lender, 1);

        assert!(registry.authorize(receipt, "alice", ReceiptClass::Lender).is_ok());
        assert_eq!(
            registry.authorize(receipt, "bob", ReceiptClass::Lender),
            Err(PoolError::receipt_mismatch(receipt, ReceiptClass::Lender))
        );
        assert_eq!(
            registry.authorize(receipt, "alice", ReceiptClass::Borrower),
            Err(PoolError::receipt_mismatch(receipt, ReceiptClass::Borrower))
        );
        assert!(registry
            .authorize(ReceiptId::new(), "alice", ReceiptClass::Lender)
            .is_err());
    }

    #[test]
    fn test_transfer_moves_ownership() {
        let mut registry = ReceiptRegistry::new();
        let receipt = registered(&mut registry, "alice", ReceiptClass::Borrower, 1);

        assert!(registry
            .transfer(receipt, ReceiptClass::Borrower, "mallory", "mallory")
            .is_err());
        registry
            .transfer(receipt, ReceiptClass::Borrower, "alice", "bob")
            .unwrap();

        assert!(registry.authorize(receipt, "bob", ReceiptClass::Borrower).is_ok());
        assert!(registry.authorize(receipt, "alice", ReceiptClass::Borrower).is_err());
        assert_eq!(registry.owned_by("bob").len(), 1);
    }

    #[test]
    fn test_records_restore() {
        let mut registry = ReceiptRegistry::new();
        let first = registered(&mut registry, "alice", ReceiptClass::Lender, 1);
        registered(&mut registry, "bob", ReceiptClass::Borrower, 2);

        let restored = ReceiptRegistry::from_records(registry.records());
        assert_eq!(restored.records().len(), 2);
        assert_eq!(restored.get(&first).map(|r| r.minted_at), Some(1));
        assert_eq!(restored.records(), registry.records());
    }
}
