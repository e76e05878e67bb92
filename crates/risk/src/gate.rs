//! Verified price gate
//!
//! Wraps the attestation verifier with the pool's feed and staleness window.
//! A `VerifiedPrice` can only be produced here, so every risk decision is
//! backed by an attestation checked in the same call.

use lendpool_core::{PoolError, Timestamp};
use lendpool_oracle::{FeedId, PriceAttestation, PriceAttestationVerifier};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct PriceGate {
    verifier: PriceAttestationVerifier,
    feed: FeedId,
    max_staleness: u64,
}

impl PriceGate {
    pub fn new(verifier: PriceAttestationVerifier, feed: FeedId, max_staleness: u64) -> Self {
        Self {
            verifier,
            feed,
            max_staleness,
        }
    }

    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    pub fn max_staleness(&self) -> u64 {
        self.max_staleness
    }

    pub fn verify(&self, raw: &[u8], now: Timestamp) -> Result<VerifiedPrice, PoolError> {
        let attestation = self.verifier.verify(raw, &self.feed, now, self.max_staleness)?;
        let price = attestation.price_decimal()?;
        Ok(VerifiedPrice { attestation, price })
    }
}

/// Collateral price in base-asset units, from an attestation verified this call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPrice {
    attestation: PriceAttestation,
    price: Decimal,
}

impl VerifiedPrice {
    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn attestation(&self) -> &PriceAttestation {
        &self.attestation
    }
}
