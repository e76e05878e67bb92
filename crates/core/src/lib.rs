//! LendPool Core - Domain types
//!
//! This crate contains the fundamental types shared by every LendPool crate:
//! - `Amount`: Non-negative decimal wrapper for pool quantities
//! - `ReceiptId` / `ReceiptClass`: Opaque position identifiers
//! - `PoolError`: The closed set of operation failures
//! - `CheckedDecimal`: Overflow-checked arithmetic that reports `PoolError`

pub mod amount;
pub mod error;
pub mod math;
pub mod receipt;

pub use amount::{Amount, AmountError};
pub use error::PoolError;
pub use math::CheckedDecimal;
pub use receipt::{ReceiptClass, ReceiptId};

/// Unix time in seconds. Every pool operation is stamped with one.
pub type Timestamp = u64;
