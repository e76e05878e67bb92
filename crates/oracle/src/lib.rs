//! LendPool price oracle
//!
//! Verifies signed price attestations against an injected trust-anchor set.
//! The verifier is the only way a price enters the pool; it is pure and keeps
//! nothing between calls.

mod error;
mod signer;
mod trust;
mod types;
mod verifier;
pub mod wire;

pub use error::{OracleError, TrustSetError};
pub use signer::{AttestationBuilder, AttestationSigner};
pub use trust::TrustAnchorSet;
pub use types::{FeedId, FeedIdError, PriceAttestation, PriceUpdate};
pub use verifier::PriceAttestationVerifier;
