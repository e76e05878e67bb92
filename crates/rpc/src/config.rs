//! Pool configuration
//!
//! Loaded from TOML. Every field has a default; decimals are written as
//! strings so they round-trip exactly.
//!
//! ```toml
//! [oracle]
//! feed_id = "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43"
//! max_staleness_secs = 60
//! trust_set_index = 0
//! trust_anchors = ["<hex ed25519 public key>", "..."]
//!
//! [interest]
//! base_rate = "0.02"
//!
//! [risk]
//! min_initiation_ratio = "1.2"
//! liquidation_threshold = "0.9"
//!
//! [liquidation]
//! penalty = "0.05"
//! ```

use lendpool_ledger::{InterestAccrualEngine, PositionLedger, RateModel};
use lendpool_oracle::{FeedId, PriceAttestationVerifier, TrustAnchorSet};
use lendpool_risk::{CollateralRiskEngine, LiquidationConfig, LiquidationEngine, PriceGate, RiskConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pool::LendingPool;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// BTC/USD on the Pyth network
pub const DEFAULT_FEED_ID: FeedId = FeedId::new([
    0xe6, 0x2d, 0xf6, 0xc8, 0xb4, 0xa8, 0x5f, 0xe1, 0xa6, 0x7d, 0xb4, 0x4d, 0xc1, 0x2d, 0xe5, 0xdb,
    0x33, 0x0f, 0x7a, 0xc6, 0x6b, 0x72, 0xdc, 0x65, 0x8a, 0xfe, 0xdf, 0x0f, 0x4a, 0x41, 0x5b, 0x43,
]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Collateral price feed
    #[serde(default = "default_feed_id")]
    pub feed_id: FeedId,

    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,

    #[serde(default)]
    pub trust_set_index: u32,

    /// Hex-encoded Ed25519 public keys, in signer-index order
    #[serde(default)]
    pub trust_anchors: Vec<String>,

    /// Defaults to a two-thirds supermajority of the anchors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<usize>,
}

fn default_feed_id() -> FeedId {
    DEFAULT_FEED_ID
}

fn default_max_staleness_secs() -> u64 {
    60
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            feed_id: default_feed_id(),
            max_staleness_secs: default_max_staleness_secs(),
            trust_set_index: 0,
            trust_anchors: Vec::new(),
            quorum: None,
        }
    }
}

impl OracleConfig {
    pub fn trust_set(&self) -> Result<TrustAnchorSet, ConfigError> {
        TrustAnchorSet::from_hex_keys(self.trust_set_index, &self.trust_anchors, self.quorum)
            .map_err(|e| ConfigError::Validation(format!("oracle: {}", e)))
    }
}

/// Full pool configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub interest: RateModel,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub liquidation: LiquidationConfig,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oracle.trust_set()?;
        if self.oracle.max_staleness_secs == 0 {
            return Err(ConfigError::Validation(
                "oracle.max_staleness_secs must be positive".to_string(),
            ));
        }
        self.interest
            .validate()
            .and_then(|_| self.risk.validate())
            .and_then(|_| self.liquidation.validate())
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    pub fn price_gate(&self) -> Result<PriceGate, ConfigError> {
        let verifier = PriceAttestationVerifier::new(self.oracle.trust_set()?);
        Ok(PriceGate::new(
            verifier,
            self.oracle.feed_id,
            self.oracle.max_staleness_secs,
        ))
    }

    /// An empty pool wired to this configuration
    pub fn build_pool(&self) -> Result<LendingPool, ConfigError> {
        let ledger = PositionLedger::new(InterestAccrualEngine::new(self.interest.clone()));
        self.assemble(ledger)
    }

    /// Wire this configuration around an existing ledger
    pub fn assemble(&self, ledger: PositionLedger) -> Result<LendingPool, ConfigError> {
        self.validate()?;
        let risk = CollateralRiskEngine::new(self.risk.clone(), self.price_gate()?);
        let liquidation = LiquidationEngine::new(self.liquidation.clone(), risk.clone());
        Ok(LendingPool::new(ledger, risk, liquidation))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Loads and validates `PoolConfig`
pub struct ConfigLoader {
    config: PoolConfig,
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: PoolConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = toml::from_str(content)?;
        config.validate()?;

        Ok(Self {
            config,
            config_path: None,
        })
    }

    pub fn get(&self) -> &PoolConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> PoolConfig {
        self.config
    }
}
