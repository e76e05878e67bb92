//! LendPool Events - hash-chained JSONL journal
//!
//! Every committed pool operation is appended as one JSON line. The chain
//! makes edits to past lines detectable; `EventReader::audit` re-checks it.

pub mod error;
pub mod event;
pub mod reader;
pub mod store;

pub use error::EventError;
pub use event::{verify_chain, EventRecord, PoolEvent, GENESIS};
pub use reader::EventReader;
pub use store::EventStore;
