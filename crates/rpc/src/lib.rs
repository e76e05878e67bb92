//! LendPool RPC - pool facade, command loop, config and CLI support

pub mod commands;
pub mod config;
pub mod context;
pub mod pool;
pub mod service;

pub use config::{ConfigError, ConfigLoader, PoolConfig};
pub use context::{AppContext, ContextError};
pub use pool::{DepositOutcome, LendingPool, PoolSnapshot, PositionView};
pub use service::{Clock, ManualClock, PoolHandle, PoolService, ServiceError, SystemClock};
