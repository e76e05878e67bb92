//! Attestation wire format
//!
//! ```text
//! attestation := "LPAT" | version u8 | trust_set_index u32
//!                | sig_count u8 | sig_count x (signer_index u8 | signature [64])
//!                | body
//! body        := emitted_at u64 | update_count u8 | update_count x update
//! update      := feed_id [32] | price i64 | confidence u64 | exponent i32
//!                | publish_time i64 | prev_publish_time i64
//! ```
//!
//! Integers are big-endian. Signers sign `SHA-256(SHA-256(body))`.

use bytes::{Buf, BufMut, BytesMut};
use sha2::{Digest, Sha256};

use crate::error::OracleError;
use crate::types::{FeedId, PriceUpdate};

pub const MAGIC: &[u8; 4] = b"LPAT";
pub const VERSION: u8 = 1;
pub const SIGNATURE_LEN: usize = 64;

const HEADER_LEN: usize = 4 + 1 + 4 + 1;
const SIGNATURE_ENTRY_LEN: usize = 1 + SIGNATURE_LEN;
const UPDATE_LEN: usize = 32 + 8 + 8 + 4 + 8 + 8;

/// One signer's contribution to an attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSignature {
    pub signer_index: u8,
    pub signature: [u8; SIGNATURE_LEN],
}

/// The signed payload: a batch of price updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationBody {
    pub emitted_at: u64,
    pub updates: Vec<PriceUpdate>,
}

impl AttestationBody {
    /// Fails when there are more updates than the count byte can carry
    pub fn encode(&self) -> Result<Vec<u8>, OracleError> {
        let count = count_byte(self.updates.len(), "price updates")?;
        let mut buf = BytesMut::with_capacity(9 + self.updates.len() * UPDATE_LEN);
        buf.put_u64(self.emitted_at);
        buf.put_u8(count);
        for update in &self.updates {
            buf.put_slice(update.feed_id.as_bytes());
            buf.put_i64(update.price);
            buf.put_u64(update.confidence);
            buf.put_i32(update.exponent);
            buf.put_i64(update.publish_time);
            buf.put_i64(update.prev_publish_time);
        }
        Ok(buf.to_vec())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OracleError> {
        let mut buf = bytes;
        need(&buf, 9, "body header")?;
        let emitted_at = buf.get_u64();
        let count = buf.get_u8() as usize;
        if count == 0 {
            return Err(OracleError::Malformed("attestation carries no price updates".to_string()));
        }

        need(&buf, count * UPDATE_LEN, "price updates")?;
        let mut updates = Vec::with_capacity(count);
        for _ in 0..count {
            let mut feed = [0u8; 32];
            buf.copy_to_slice(&mut feed);
            updates.push(PriceUpdate {
                feed_id: FeedId::new(feed),
                price: buf.get_i64(),
                confidence: buf.get_u64(),
                exponent: buf.get_i32(),
                publish_time: buf.get_i64(),
                prev_publish_time: buf.get_i64(),
            });
        }

        if buf.has_remaining() {
            return Err(OracleError::Malformed(format!(
                "{} trailing bytes after price updates",
                buf.remaining()
            )));
        }

        Ok(Self {
            emitted_at,
            updates,
        })
    }
}

/// A decoded (not yet verified) attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttestation {
    pub trust_set_index: u32,
    pub signatures: Vec<SignerSignature>,
    /// Raw body bytes exactly as signed
    pub body_bytes: Vec<u8>,
    pub body: AttestationBody,
}

impl SignedAttestation {
    pub fn decode(raw: &[u8]) -> Result<Self, OracleError> {
        let mut buf = raw;
        need(&buf, HEADER_LEN, "header")?;

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(OracleError::Malformed("bad magic".to_string()));
        }

        let version = buf.get_u8();
        if version != VERSION {
            return Err(OracleError::Malformed(format!("unsupported version {}", version)));
        }

        let trust_set_index = buf.get_u32();
        let sig_count = buf.get_u8() as usize;
        need(&buf, sig_count * SIGNATURE_ENTRY_LEN, "signatures")?;

        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            let signer_index = buf.get_u8();
            let mut signature = [0u8; SIGNATURE_LEN];
            buf.copy_to_slice(&mut signature);
            signatures.push(SignerSignature {
                signer_index,
                signature,
            });
        }

        // Whatever is left is the signed body
        let body = AttestationBody::decode(buf)?;

        Ok(Self {
            trust_set_index,
            signatures,
            body_bytes: buf.to_vec(),
            body,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, OracleError> {
        let sig_count = count_byte(self.signatures.len(), "signatures")?;
        let mut buf = BytesMut::with_capacity(
            HEADER_LEN + self.signatures.len() * SIGNATURE_ENTRY_LEN + self.body_bytes.len(),
        );
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u32(self.trust_set_index);
        buf.put_u8(sig_count);
        for sig in &self.signatures {
            buf.put_u8(sig.signer_index);
            buf.put_slice(&sig.signature);
        }
        buf.put_slice(&self.body_bytes);
        Ok(buf.to_vec())
    }

    /// Digest every signer must have signed
    pub fn digest(&self) -> [u8; 32] {
        body_digest(&self.body_bytes)
    }
}

/// Double SHA-256 of the body bytes
pub fn body_digest(body: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(body);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn count_byte(len: usize, what: &str) -> Result<u8, OracleError> {
    u8::try_from(len).map_err(|_| {
        OracleError::Malformed(format!("cannot encode {} {}: at most {} fit", len, what, u8::MAX))
    })
}

fn need(buf: &&[u8], len: usize, what: &str) -> Result<(), OracleError> {
    if buf.remaining() < len {
        return Err(OracleError::Malformed(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}
