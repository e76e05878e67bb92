//! LendPool Risk Engine - collateral admission and liquidation
//!
//! Every price used here comes from an attestation verified in the same call
//! (`PriceGate`). The engines validate inside a ledger transaction and only
//! commit when every check passes.

pub mod config;
pub mod engine;
pub mod gate;
pub mod liquidation;

pub use config::{LiquidationConfig, RiskConfig};
pub use engine::{collateral_ratio, BorrowOutcome, CollateralRiskEngine};
pub use gate::{PriceGate, VerifiedPrice};
pub use liquidation::{LiquidationEngine, SeizureResult};

#[cfg(test)]
pub(crate) mod fixtures {
    use lendpool_core::Timestamp;
    use lendpool_oracle::{
        AttestationBuilder, AttestationSigner, FeedId, PriceAttestationVerifier, PriceUpdate,
        TrustAnchorSet,
    };
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;

    use crate::{CollateralRiskEngine, LiquidationConfig, LiquidationEngine, PriceGate, RiskConfig};

    pub const T0: Timestamp = 1_700_000_000;

    /// Three-signer trust set with a 60 second staleness window
    pub struct Oracle {
        signers: Vec<AttestationSigner>,
        feed: FeedId,
        gate: PriceGate,
    }

    impl Oracle {
        pub fn new() -> Self {
            let signers: Vec<AttestationSigner> = (0..3).map(AttestationSigner::generate).collect();
            let keys = signers.iter().map(|s| s.verifying_key()).collect();
            let trust = TrustAnchorSet::new(1, keys, None).unwrap();
            let feed = FeedId::new([0x42; 32]);
            let gate = PriceGate::new(PriceAttestationVerifier::new(trust), feed, 60);
            Self {
                signers,
                feed,
                gate,
            }
        }

        pub fn risk_engine(&self) -> CollateralRiskEngine {
            CollateralRiskEngine::new(RiskConfig::default(), self.gate.clone())
        }

        pub fn liquidation_engine(&self, config: LiquidationConfig) -> LiquidationEngine {
            LiquidationEngine::new(config, self.risk_engine())
        }

        /// Attestation for `price` with two decimal places
        pub fn attest(&self, price: Decimal, publish_time: Timestamp) -> Vec<u8> {
            let mantissa = (price * Decimal::ONE_HUNDRED).to_i64().unwrap();
            let signers: Vec<&AttestationSigner> = self.signers.iter().collect();
            AttestationBuilder::new(1)
                .emitted_at(publish_time)
                .update(PriceUpdate::new(self.feed, mantissa, 0, -2, publish_time as i64))
                .sign(&signers)
                .unwrap()
        }
    }
}
