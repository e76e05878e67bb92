//! Oracle error types

use lendpool_core::{PoolError, Timestamp};
use thiserror::Error;

/// Reasons a price attestation is rejected by the verifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Bytes do not decode as an attestation
    #[error("Malformed attestation: {0}")]
    Malformed(String),

    /// Signature set is wrong, bad, or below quorum
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// None of the decoded updates is for the requested feed
    #[error("Feed mismatch: expected {expected}, found [{found}]")]
    FeedMismatch { expected: String, found: String },

    /// Price is older than the staleness window
    #[error("Stale price: published at {publish_time}, now {now}, max staleness {max_staleness}s")]
    StalePrice {
        publish_time: i64,
        now: Timestamp,
        max_staleness: u64,
    },
}

impl From<OracleError> for PoolError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Malformed(reason) => PoolError::MalformedAttestation(reason),
            OracleError::InvalidSignature(reason) => PoolError::InvalidSignature(reason),
            OracleError::FeedMismatch { expected, found } => {
                PoolError::FeedMismatch { expected, found }
            }
            OracleError::StalePrice {
                publish_time,
                now,
                max_staleness,
            } => PoolError::StalePrice {
                publish_time,
                now,
                max_staleness,
            },
        }
    }
}

/// Trust-anchor configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustSetError {
    #[error("Trust anchor set is empty")]
    Empty,

    #[error("Quorum {quorum} out of range for {anchors} anchors")]
    QuorumOutOfRange { quorum: usize, anchors: usize },

    #[error("Too many trust anchors: {0} (max 256)")]
    TooManyAnchors(usize),

    #[error("Invalid trust anchor key at position {position}: {reason}")]
    InvalidKey { position: usize, reason: String },

    #[error("Duplicate trust anchor at position {0}")]
    DuplicateAnchor(usize),
}
