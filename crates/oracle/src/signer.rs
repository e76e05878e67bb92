//! Attestation signing
//!
//! The pool never signs prices itself. These types exist for the tooling side
//! of the trust boundary: test fixtures and the CLI `attest` command build
//! correctly encoded, really-signed attestations with them.

use ed25519_dalek::{Signer as DalekSigner, SigningKey, VerifyingKey};

use crate::error::{OracleError, TrustSetError};
use crate::types::PriceUpdate;
use crate::wire::{body_digest, AttestationBody, SignedAttestation, SignerSignature};

/// A trust-anchor key and its position in the signer set
pub struct AttestationSigner {
    signer_index: u8,
    signing_key: SigningKey,
}

impl AttestationSigner {
    /// Generate a new random signing key
    pub fn generate(signer_index: u8) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signer_index,
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte hex seed
    pub fn from_hex(signer_index: u8, hex_seed: &str) -> Result<Self, TrustSetError> {
        let bytes = hex::decode(hex_seed.trim()).map_err(|e| TrustSetError::InvalidKey {
            position: signer_index as usize,
            reason: format!("invalid seed hex: {}", e),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| TrustSetError::InvalidKey {
            position: signer_index as usize,
            reason: "seed must be 32 bytes".to_string(),
        })?;
        Ok(Self {
            signer_index,
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn signer_index(&self) -> u8 {
        self.signer_index
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Export the seed as hex (for storage)
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn sign_digest(&self, digest: &[u8; 32]) -> SignerSignature {
        SignerSignature {
            signer_index: self.signer_index,
            signature: self.signing_key.sign(digest).to_bytes(),
        }
    }
}

/// Builds a signed attestation blob
#[derive(Debug, Clone)]
pub struct AttestationBuilder {
    trust_set_index: u32,
    emitted_at: u64,
    updates: Vec<PriceUpdate>,
}

impl AttestationBuilder {
    pub fn new(trust_set_index: u32) -> Self {
        Self {
            trust_set_index,
            emitted_at: 0,
            updates: Vec::new(),
        }
    }

    pub fn emitted_at(mut self, emitted_at: u64) -> Self {
        self.emitted_at = emitted_at;
        self
    }

    pub fn update(mut self, update: PriceUpdate) -> Self {
        self.updates.push(update);
        self
    }

    /// Encode the body and collect one signature per signer, in signer order
    pub fn sign(self, signers: &[&AttestationSigner]) -> Result<Vec<u8>, OracleError> {
        let body = AttestationBody {
            emitted_at: self.emitted_at,
            updates: self.updates,
        };
        let body_bytes = body.encode()?;
        let digest = body_digest(&body_bytes);

        let mut ordered: Vec<&AttestationSigner> = signers.to_vec();
        ordered.sort_by_key(|s| s.signer_index());

        SignedAttestation {
            trust_set_index: self.trust_set_index,
            signatures: ordered.iter().map(|s| s.sign_digest(&digest)).collect(),
            body_bytes,
            body,
        }
        .encode()
    }
}
