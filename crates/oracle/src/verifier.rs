//! Price attestation verifier
//!
//! Single choke point for external prices: decode, check the signer quorum,
//! select the requested feed, reject stale data. Holds only the injected trust
//! set; nothing verified is retained between calls.

use ed25519_dalek::Signature;
use lendpool_core::Timestamp;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::trust::TrustAnchorSet;
use crate::types::{FeedId, PriceAttestation};
use crate::wire::SignedAttestation;

#[derive(Debug, Clone)]
pub struct PriceAttestationVerifier {
    trust: Arc<TrustAnchorSet>,
}

impl PriceAttestationVerifier {
    pub fn new(trust: TrustAnchorSet) -> Self {
        Self {
            trust: Arc::new(trust),
        }
    }

    pub fn trust_set(&self) -> &TrustAnchorSet {
        &self.trust
    }

    /// Decode and verify `raw`, returning the price for `expected_feed`.
    pub fn verify(
        &self,
        raw: &[u8],
        expected_feed: &FeedId,
        now: Timestamp,
        max_staleness: u64,
    ) -> Result<PriceAttestation, OracleError> {
        let result = self.verify_inner(raw, expected_feed, now, max_staleness);
        if let Err(ref err) = result {
            warn!(feed = %expected_feed, error = %err, "price attestation rejected");
        }
        result
    }

    fn verify_inner(
        &self,
        raw: &[u8],
        expected_feed: &FeedId,
        now: Timestamp,
        max_staleness: u64,
    ) -> Result<PriceAttestation, OracleError> {
        let signed = SignedAttestation::decode(raw)?;
        let signers = self.check_quorum(&signed)?;

        let update = signed
            .body
            .updates
            .iter()
            .find(|u| &u.feed_id == expected_feed)
            .ok_or_else(|| OracleError::FeedMismatch {
                expected: expected_feed.to_string(),
                found: signed
                    .body
                    .updates
                    .iter()
                    .map(|u| u.feed_id.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        if update.price <= 0 {
            return Err(OracleError::Malformed(format!(
                "non-positive price {} for feed {}",
                update.price, expected_feed
            )));
        }

        let attestation = PriceAttestation {
            feed_id: update.feed_id,
            price: update.price,
            exponent: update.exponent,
            confidence: update.confidence,
            publish_time: update.publish_time,
            signer_set_quorum_met: true,
        };

        if attestation.age(now) > max_staleness {
            return Err(OracleError::StalePrice {
                publish_time: update.publish_time,
                now,
                max_staleness,
            });
        }

        debug!(
            feed = %expected_feed,
            price = update.price,
            exponent = update.exponent,
            publish_time = update.publish_time,
            signers,
            "price attestation verified"
        );

        Ok(attestation)
    }

    /// Verify every signature and count distinct trusted signers.
    ///
    /// Any bad signature rejects the whole attestation, as does an unknown or
    /// repeated signer index.
    fn check_quorum(&self, signed: &SignedAttestation) -> Result<usize, OracleError> {
        if signed.trust_set_index != self.trust.index() {
            return Err(OracleError::InvalidSignature(format!(
                "attestation signed by set {}, trusted set is {}",
                signed.trust_set_index,
                self.trust.index()
            )));
        }

        let digest = signed.digest();
        let mut last_index: Option<u8> = None;

        for sig in &signed.signatures {
            if last_index.is_some_and(|last| sig.signer_index <= last) {
                return Err(OracleError::InvalidSignature(format!(
                    "signer index {} out of order",
                    sig.signer_index
                )));
            }
            last_index = Some(sig.signer_index);

            let key = self.trust.anchor(sig.signer_index).ok_or_else(|| {
                OracleError::InvalidSignature(format!("unknown signer index {}", sig.signer_index))
            })?;

            let signature = Signature::from_bytes(&sig.signature);
            key.verify_strict(&digest, &signature).map_err(|e| {
                OracleError::InvalidSignature(format!(
                    "signature from signer {} failed: {}",
                    sig.signer_index, e
                ))
            })?;
        }

        let valid = signed.signatures.len();
        if valid < self.trust.quorum() {
            return Err(OracleError::InvalidSignature(format!(
                "quorum not met: {} of {} required signatures",
                valid,
                self.trust.quorum()
            )));
        }

        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{AttestationBuilder, AttestationSigner};
    use crate::types::PriceUpdate;
    use crate::wire::SignerSignature;

    const NOW: Timestamp = 1_700_000_000;
    const MAX_STALENESS: u64 = 60;

    struct Fixture {
        signers: Vec<AttestationSigner>,
        verifier: PriceAttestationVerifier,
        feed: FeedId,
    }

    fn fixture(n: u8) -> Fixture {
        let signers: Vec<AttestationSigner> = (0..n).map(AttestationSigner::generate).collect();
        let keys = signers.iter().map(|s| s.verifying_key()).collect();
        let trust = TrustAnchorSet::new(1, keys, None).unwrap();
        Fixture {
            signers,
            verifier: PriceAttestationVerifier::new(trust),
            feed: FeedId::new([0xAB; 32]),
        }
    }

    impl Fixture {
        fn attest(&self, price: i64, publish_time: i64, signer_count: usize) -> Vec<u8> {
            let signers: Vec<&AttestationSigner> = self.signers.iter().take(signer_count).collect();
            AttestationBuilder::new(1)
                .emitted_at(publish_time as u64)
                .update(PriceUpdate::new(self.feed, price, 10, -2, publish_time))
                .sign(&signers)
                .unwrap()
        }
    }

    #[test]
    fn test_verify_accepts_quorum() {
        let fx = fixture(4);
        let raw = fx.attest(6_500_000, NOW as i64 - 5, 3);

        let att = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS).unwrap();
        assert_eq!(att.price, 6_500_000);
        assert_eq!(att.exponent, -2);
        assert_eq!(att.confidence, 10);
        assert!(att.signer_set_quorum_met);
    }

    #[test]
    fn test_verify_rejects_below_quorum() {
        let fx = fixture(4);
        let raw = fx.attest(6_500_000, NOW as i64, 2);

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_untrusted_signer() {
        let fx = fixture(3);
        let outsider = AttestationSigner::generate(2);
        let raw = AttestationBuilder::new(1)
            .update(PriceUpdate::new(fx.feed, 100, 0, 0, NOW as i64))
            .sign(&[&fx.signers[0], &fx.signers[1], &outsider])
            .unwrap();

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let fx = fixture(3);
        let mut raw = fx.attest(100, NOW as i64, 3);
        // Last byte belongs to prev_publish_time of the only update
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_duplicate_signer() {
        let fx = fixture(3);
        let signed = SignedAttestation::decode(&fx.attest(100, NOW as i64, 2)).unwrap();
        let mut sigs = signed.signatures.clone();
        sigs.push(SignerSignature {
            signer_index: sigs[1].signer_index,
            signature: sigs[1].signature,
        });
        let raw = SignedAttestation {
            signatures: sigs,
            ..signed
        }
        .encode()
        .unwrap();

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_wrong_trust_set_index() {
        let fx = fixture(1);
        let raw = AttestationBuilder::new(2)
            .update(PriceUpdate::new(fx.feed, 100, 0, 0, NOW as i64))
            .sign(&[&fx.signers[0]])
            .unwrap();

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_other_feed() {
        let fx = fixture(1);
        let raw = fx.attest(100, NOW as i64, 1);
        let other = FeedId::new([0x01; 32]);

        let result = fx.verifier.verify(&raw, &other, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::FeedMismatch { .. })));
    }

    #[test]
    fn test_verify_selects_feed_from_batch() {
        let fx = fixture(1);
        let other = FeedId::new([0x02; 32]);
        let raw = AttestationBuilder::new(1)
            .update(PriceUpdate::new(other, 1, 0, 0, NOW as i64))
            .update(PriceUpdate::new(fx.feed, 4200, 3, 0, NOW as i64))
            .sign(&[&fx.signers[0]])
            .unwrap();

        let att = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS).unwrap();
        assert_eq!(att.price, 4200);
        assert_eq!(att.feed_id, fx.feed);
    }

    #[test]
    fn test_verify_rejects_stale_price() {
        let fx = fixture(1);
        let raw = fx.attest(100, NOW as i64 - 61, 1);

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::StalePrice { .. })));

        // Exactly at the window edge is still fresh
        let edge = fx.attest(100, NOW as i64 - 60, 1);
        assert!(fx.verifier.verify(&edge, &fx.feed, NOW, MAX_STALENESS).is_ok());
    }

    #[test]
    fn test_signature_checked_before_staleness() {
        let fx = fixture(4);
        let raw = fx.attest(100, NOW as i64 - 1_000, 1);

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_rejects_non_positive_price() {
        let fx = fixture(1);
        let raw = fx.attest(0, NOW as i64, 1);

        let result = fx.verifier.verify(&raw, &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::Malformed(_))));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let fx = fixture(1);
        let result = fx.verifier.verify(b"not an attestation", &fx.feed, NOW, MAX_STALENESS);
        assert!(matches!(result, Err(OracleError::Malformed(_))));
    }
}
