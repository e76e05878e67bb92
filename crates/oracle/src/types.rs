//! Core oracle types

use lendpool_core::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OracleError;

/// 32-byte price feed identifier, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedId([u8; 32]);

impl FeedId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, FeedIdError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| FeedIdError(format!("{}: {}", s, e)))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FeedIdError(format!("{}: feed id must be 32 bytes", s)))?;
        Ok(Self(array))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for FeedId {
    type Err = FeedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for FeedId {
    type Error = FeedIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<FeedId> for String {
    fn from(feed: FeedId) -> Self {
        feed.to_string()
    }
}

/// Invalid feed id text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid feed id {0}")]
pub struct FeedIdError(String);

/// One decoded price update, before any signature check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub feed_id: FeedId,
    /// Price mantissa; the real price is `price * 10^exponent`
    pub price: i64,
    /// Confidence interval mantissa, same exponent as `price`
    pub confidence: u64,
    pub exponent: i32,
    pub publish_time: i64,
    pub prev_publish_time: i64,
}

impl PriceUpdate {
    /// Update with no previous publish time, for tooling and tests
    pub fn new(feed_id: FeedId, price: i64, confidence: u64, exponent: i32, publish_time: i64) -> Self {
        Self {
            feed_id,
            price,
            confidence,
            exponent,
            publish_time,
            prev_publish_time: publish_time,
        }
    }
}

/// A verified price, valid only for the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceAttestation {
    pub feed_id: FeedId,
    pub price: i64,
    pub exponent: i32,
    pub confidence: u64,
    pub publish_time: i64,
    pub signer_set_quorum_met: bool,
}

impl PriceAttestation {
    /// Price as a decimal: base-asset units per collateral unit
    pub fn price_decimal(&self) -> Result<Decimal, OracleError> {
        scale_by_exponent(self.price as i128, self.exponent)
    }

    pub fn confidence_decimal(&self) -> Result<Decimal, OracleError> {
        scale_by_exponent(self.confidence as i128, self.exponent)
    }

    /// Seconds between publication and `now`; future publish times count as 0.
    pub fn age(&self, now: Timestamp) -> u64 {
        let age = (now as i128) - (self.publish_time as i128);
        age.clamp(0, u64::MAX as i128) as u64
    }
}

fn scale_by_exponent(mantissa: i128, exponent: i32) -> Result<Decimal, OracleError> {
    if exponent <= 0 {
        return Decimal::try_from_i128_with_scale(mantissa, exponent.unsigned_abs()).map_err(|e| {
            OracleError::Malformed(format!("price {}e{} out of range: {}", mantissa, exponent, e))
        });
    }

    let mut value = Decimal::try_from_i128_with_scale(mantissa, 0)
        .map_err(|e| OracleError::Malformed(format!("price {} out of range: {}", mantissa, e)))?;
    for _ in 0..exponent {
        value = value.checked_mul(Decimal::TEN).ok_or_else(|| {
            OracleError::Malformed(format!("price {}e{} overflows", mantissa, exponent))
        })?;
    }
    Ok(value)
}
