//! Trust-anchor signer set
//!
//! The set of keys whose signatures make a price attestation trustworthy.
//! It is injected at construction; nothing in the verifier hardcodes keys.

use ed25519_dalek::VerifyingKey;
use std::collections::HashSet;

use crate::error::TrustSetError;

#[derive(Debug, Clone)]
pub struct TrustAnchorSet {
    index: u32,
    anchors: Vec<VerifyingKey>,
    quorum: usize,
}

impl TrustAnchorSet {
    /// Build a set. `quorum = None` selects the supermajority for the set size.
    pub fn new(
        index: u32,
        anchors: Vec<VerifyingKey>,
        quorum: Option<usize>,
    ) -> Result<Self, TrustSetError> {
        if anchors.is_empty() {
            return Err(TrustSetError::Empty);
        }
        // signer_index is a u8 on the wire
        if anchors.len() > 256 {
            return Err(TrustSetError::TooManyAnchors(anchors.len()));
        }

        let mut seen = HashSet::new();
        for (position, key) in anchors.iter().enumerate() {
            if !seen.insert(key.to_bytes()) {
                return Err(TrustSetError::DuplicateAnchor(position));
            }
        }

        let quorum = quorum.unwrap_or_else(|| Self::supermajority(anchors.len()));
        if quorum == 0 || quorum > anchors.len() {
            return Err(TrustSetError::QuorumOutOfRange {
                quorum,
                anchors: anchors.len(),
            });
        }

        Ok(Self {
            index,
            anchors,
            quorum,
        })
    }

    /// Build from hex-encoded 32-byte public keys
    pub fn from_hex_keys(
        index: u32,
        keys: &[String],
        quorum: Option<usize>,
    ) -> Result<Self, TrustSetError> {
        let anchors = keys
            .iter()
            .enumerate()
            .map(|(position, key)| parse_key(position, key))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(index, anchors, quorum)
    }

    /// Smallest count strictly greater than two thirds of `n`
    pub fn supermajority(n: usize) -> usize {
        n * 2 / 3 + 1
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn anchor(&self, signer_index: u8) -> Option<&VerifyingKey> {
        self.anchors.get(signer_index as usize)
    }
}

fn parse_key(position: usize, key: &str) -> Result<VerifyingKey, TrustSetError> {
    let bytes = hex::decode(key.trim()).map_err(|e| TrustSetError::InvalidKey {
        position,
        reason: format!("invalid hex: {}", e),
    })?;
    let array: [u8; 32] = bytes.try_into().map_err(|_| TrustSetError::InvalidKey {
        position,
        reason: "public key must be 32 bytes".to_string(),
    })?;
    VerifyingKey::from_bytes(&array).map_err(|e| TrustSetError::InvalidKey {
        position,
        reason: e.to_string(),
    })
}
