//! Application context - wires the persisted pool together for the CLI
//!
//! Data directory layout:
//!
//! ```text
//! <data>/lendpool.toml   pool configuration
//! <data>/state.json      ledger + receipt snapshot
//! <data>/journal/        hash-chained event journal
//! ```

use chrono::{DateTime, Utc};
use lendpool_core::Timestamp;
use lendpool_events::{EventError, EventReader, EventRecord, EventStore};
use lendpool_ledger::{InterestAccrualEngine, PositionLedger, ReceiptRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, ConfigLoader, PoolConfig};
use crate::pool::{LendingPool, PoolSnapshot};

pub const CONFIG_FILE: &str = "lendpool.toml";
pub const STATE_FILE: &str = "state.json";
pub const JOURNAL_DIR: &str = "journal";

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("No pool at {0}; run `lendpool init` first")]
    NotInitialized(String),

    #[error("Pool already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Journal error: {0}")]
    Event(#[from] EventError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Application context - one loaded pool plus its journal
pub struct AppContext {
    pub pool: LendingPool,
    config: PoolConfig,
    journal: EventStore,
    data_path: PathBuf,
}

impl AppContext {
    /// Create the data directory for a new, empty pool
    pub fn init(data_path: impl AsRef<Path>, config: PoolConfig) -> Result<Self, ContextError> {
        let data_path = data_path.as_ref();
        let config_path = data_path.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(ContextError::AlreadyInitialized(data_path.display().to_string()));
        }

        let pool = config.build_pool()?;
        fs::create_dir_all(data_path.join(JOURNAL_DIR))?;
        fs::write(&config_path, config.to_toml()?)?;

        let ctx = Self {
            journal: EventStore::open(data_path.join(JOURNAL_DIR))?,
            pool,
            config,
            data_path: data_path.to_path_buf(),
        };
        ctx.save_state()?;

        info!(path = %data_path.display(), "pool initialized");
        Ok(ctx)
    }

    /// Load config, snapshot and journal from an initialized data directory
    pub fn open(data_path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let data_path = data_path.as_ref();
        let config_path = data_path.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ContextError::NotInitialized(data_path.display().to_string()));
        }

        let config = ConfigLoader::load_file(&config_path)?.into_config();

        let state_path = data_path.join(STATE_FILE);
        let snapshot: PoolSnapshot = if state_path.exists() {
            serde_json::from_str(&fs::read_to_string(&state_path)?)?
        } else {
            PoolSnapshot::default()
        };

        let ledger = PositionLedger::restore(
            snapshot.ledger,
            InterestAccrualEngine::new(config.interest.clone()),
        );
        let pool = config
            .assemble(ledger)?
            .with_receipts(ReceiptRegistry::from_records(snapshot.receipts));
        let journal = EventStore::open(data_path.join(JOURNAL_DIR))?;

        debug!(
            path = %data_path.display(),
            last_sequence = journal.last_sequence(),
            "pool loaded"
        );

        Ok(Self {
            pool,
            config,
            journal,
            data_path: data_path.to_path_buf(),
        })
    }

    /// Journal pending events, then persist the snapshot
    pub fn commit(&mut self, now: Timestamp) -> Result<Vec<EventRecord>, ContextError> {
        let timestamp = DateTime::<Utc>::from_timestamp(now as i64, 0).unwrap_or_default();
        let records = self
            .pool
            .drain_events()
            .into_iter()
            .map(|event| self.journal.append(timestamp, event))
            .collect::<Result<Vec<_>, _>>()?;
        self.save_state()?;
        Ok(records)
    }

    /// Write the snapshot to a temp file, then rename over the old one
    fn save_state(&self) -> Result<(), ContextError> {
        let state_path = self.data_path.join(STATE_FILE);
        let tmp_path = self.data_path.join(format!("{}.tmp", STATE_FILE));
        let json = serde_json::to_string_pretty(&self.pool.snapshot())?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &state_path)?;
        Ok(())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_path.join(JOURNAL_DIR)
    }

    pub fn last_sequence(&self) -> u64 {
        self.journal.last_sequence()
    }

    /// Re-verify the journal hash chain. Returns the number of records.
    pub fn audit(&self) -> Result<usize, ContextError> {
        Ok(EventReader::from_directory(self.journal_path())?.audit()?)
    }
}
