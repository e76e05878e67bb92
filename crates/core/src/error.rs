//! Pool operation errors
//!
//! The set is closed: every failure an operation can report is one of these
//! variants, and a failed operation commits nothing.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::receipt::{ReceiptClass, ReceiptId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // === Input errors ===
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Receipt {receipt} is not a valid {expected} receipt")]
    ReceiptMismatch {
        receipt: ReceiptId,
        expected: ReceiptClass,
    },

    // === Liquidity / balance errors ===
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient pool liquidity: available {available}, requested {requested}")]
    InsufficientLiquidity {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient repayment: debt {debt}, supplied {supplied}")]
    InsufficientRepayment { debt: Decimal, supplied: Decimal },

    #[error("Nothing to repay on receipt {0}")]
    NothingToRepay(ReceiptId),

    // === Oracle errors ===
    #[error("Stale price: published at {publish_time}, now {now}, max staleness {max_staleness}s")]
    StalePrice {
        publish_time: i64,
        now: u64,
        max_staleness: u64,
    },

    #[error("Invalid attestation signature: {0}")]
    InvalidSignature(String),

    #[error("Price feed mismatch: expected {expected}, found {found}")]
    FeedMismatch { expected: String, found: String },

    #[error("Malformed attestation: {0}")]
    MalformedAttestation(String),

    // === Risk errors ===
    #[error("Undercollateralized: health factor {health_factor} below required {required}")]
    UndercollateralizedBorrow {
        health_factor: Decimal,
        required: Decimal,
    },

    #[error("Position {receipt} is healthy (health factor {health_factor})")]
    PositionHealthy {
        receipt: ReceiptId,
        health_factor: Decimal,
    },

    #[error("Nothing to liquidate on receipt {0}")]
    NothingToLiquidate(ReceiptId),

    // === Arithmetic ===
    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),
}

impl PoolError {
    /// Coarse error family, used for structured logs and the journal.
    pub fn category(&self) -> &'static str {
        match self {
            PoolError::ZeroAmount | PoolError::ReceiptMismatch { .. } => "input",
            PoolError::InsufficientBalance { .. }
            | PoolError::InsufficientLiquidity { .. }
            | PoolError::InsufficientRepayment { .. }
            | PoolError::NothingToRepay(_) => "liquidity",
            PoolError::StalePrice { .. }
            | PoolError::InvalidSignature(_)
            | PoolError::FeedMismatch { .. }
            | PoolError::MalformedAttestation(_) => "oracle",
            PoolError::UndercollateralizedBorrow { .. }
            | PoolError::PositionHealthy { .. }
            | PoolError::NothingToLiquidate(_) => "risk",
            PoolError::ArithmeticOverflow(_) => "arithmetic",
        }
    }

    pub fn receipt_mismatch(receipt: ReceiptId, expected: ReceiptClass) -> Self {
        PoolError::ReceiptMismatch { receipt, expected }
    }
}
