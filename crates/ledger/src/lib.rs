//! LendPool Ledger - positions and pool aggregates
//!
//! The ledger is the only owner of lender and borrower positions and of the
//! pool-wide `PoolState`. Interest accrual lives here too, because every
//! operation must accrue the positions it touches before validating.

pub mod error;
pub mod interest;
pub mod ledger;
pub mod position;
pub mod receipt;
pub mod state;
pub mod tx;

pub use error::ParameterError;
pub use interest::{InterestAccrualEngine, RateModel, SECONDS_PER_YEAR};
pub use ledger::{LedgerSnapshot, PositionLedger, Repayment, Withdrawal};
pub use position::{BorrowerPosition, LenderPosition};
pub use receipt::{ReceiptRecord, ReceiptRegistry};
pub use state::PoolState;
pub use tx::LedgerTx;
