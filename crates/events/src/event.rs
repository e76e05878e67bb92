//! Journal records
//!
//! One record per committed pool operation. Records form a SHA-256 hash
//! chain: each carries the hash of its predecessor, starting from `GENESIS`.

use chrono::{DateTime, Utc};
use lendpool_core::ReceiptId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EventError;

pub const GENESIS: &str = "GENESIS";

/// A committed pool operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    Deposited {
        receipt: ReceiptId,
        owner: String,
        amount: Decimal,
        total_deposited: Decimal,
    },
    Withdrawn {
        receipt: ReceiptId,
        yield_paid: Decimal,
        principal_paid: Decimal,
    },
    Borrowed {
        receipt: ReceiptId,
        owner: String,
        amount: Decimal,
        collateral_added: Decimal,
        price: Decimal,
        health_factor: Decimal,
    },
    CollateralAdded {
        receipt: ReceiptId,
        amount: Decimal,
    },
    CollateralWithdrawn {
        receipt: ReceiptId,
        amount: Decimal,
        price: Decimal,
    },
    Repaid {
        receipt: ReceiptId,
        debt_repaid: Decimal,
        change: Decimal,
        collateral_released: Decimal,
    },
    Liquidated {
        receipt: ReceiptId,
        liquidator: String,
        debt_repaid: Decimal,
        collateral_seized: Decimal,
        collateral_returned: Decimal,
        liquidation_fee: Decimal,
        bad_debt: Decimal,
        price: Decimal,
    },
    ReceiptTransferred {
        receipt: ReceiptId,
        from: String,
        to: String,
    },
}

impl PoolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::Deposited { .. } => "deposited",
            PoolEvent::Withdrawn { .. } => "withdrawn",
            PoolEvent::Borrowed { .. } => "borrowed",
            PoolEvent::CollateralAdded { .. } => "collateral_added",
            PoolEvent::CollateralWithdrawn { .. } => "collateral_withdrawn",
            PoolEvent::Repaid { .. } => "repaid",
            PoolEvent::Liquidated { .. } => "liquidated",
            PoolEvent::ReceiptTransferred { .. } => "receipt_transferred",
        }
    }
}

/// A journal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub prev_hash: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub event: PoolEvent,
}

impl EventRecord {
    /// Build the record that follows `prev` (or the genesis record)
    pub fn chained(
        prev: Option<&EventRecord>,
        timestamp: DateTime<Utc>,
        event: PoolEvent,
    ) -> Result<Self, EventError> {
        let (sequence, prev_hash) = match prev {
            Some(p) => (p.sequence + 1, p.hash.clone()),
            None => (1, GENESIS.to_string()),
        };
        let mut record = Self {
            sequence,
            prev_hash,
            hash: String::new(),
            timestamp,
            event,
        };
        record.hash = record.compute_hash()?;
        Ok(record)
    }

    /// SHA-256 over everything except `hash`
    pub fn compute_hash(&self) -> Result<String, EventError> {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(serde_json::to_vec(&self.event)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Check links, hashes and sequence numbers across `records`
pub fn verify_chain(records: &[EventRecord]) -> Result<(), EventError> {
    let mut prev_hash = GENESIS.to_string();

    for (i, record) in records.iter().enumerate() {
        if record.prev_hash != prev_hash {
            return Err(EventError::BrokenLink {
                sequence: record.sequence,
                expected: prev_hash,
                actual: record.prev_hash.clone(),
            });
        }

        let calculated = record.compute_hash()?;
        if record.hash != calculated {
            return Err(EventError::InvalidHash {
                sequence: record.sequence,
                expected: calculated,
                actual: record.hash.clone(),
            });
        }

        let expected = i as u64 + 1;
        if record.sequence != expected {
            return Err(EventError::InvalidSequence {
                expected,
                actual: record.sequence,
            });
        }

        prev_hash = record.hash.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn deposit(amount: Decimal) -> PoolEvent {
        PoolEvent::Deposited {
            receipt: ReceiptId::new(),
            owner: "alice".to_string(),
            amount,
            total_deposited: amount,
        }
    }

    fn chain(n: usize) -> Vec<EventRecord> {
        let mut records: Vec<EventRecord> = Vec::new();
        for i in 0..n {
            let record =
                EventRecord::chained(records.last(), Utc::now(), deposit(Decimal::from(i + 1)))
                    .unwrap();
            records.push(record);
        }
        records
    }

    #[test]
    fn test_hash_deterministic() {
        let record = chain(1).remove(0);
        assert_eq!(record.compute_hash().unwrap(), record.hash);
        assert_eq!(record.prev_hash, GENESIS);
        assert_eq!(record.sequence, 1);
    }

    #[test]
    fn test_verify_valid_chain() {
        assert!(verify_chain(&chain(3)).is_ok());
        assert!(verify_chain(&[]).is_ok());
    }

    #[test]
    fn test_tampered_event_detected() {
        let mut records = chain(3);
        records[1].event = deposit(dec!(999));
        assert!(matches!(
            verify_chain(&records),
            Err(EventError::InvalidHash { sequence: 2, .. })
        ));
    }

    #[test]
    fn test_removed_record_detected() {
        let mut records = chain(3);
        records.remove(1);
        assert!(matches!(
            verify_chain(&records),
            Err(EventError::BrokenLink { sequence: 3, .. })
        ));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(deposit(dec!(5))).unwrap();
        assert_eq!(json["type"], "deposited");
        assert_eq!(json["amount"], "5");
    }
}
