//! Error types for BLS key and signature handling.

use thiserror::Error;

/// Errors that can occur during BLS key or signature operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlsError {
    /// The secret key bytes do not encode a valid scalar.
    #[error("invalid secret key encoding")]
    InvalidSecretKey,

    /// The public key bytes do not encode a valid G1 point.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// The signature bytes do not encode a valid G2 point.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// Aggregation was attempted over an empty signature set.
    #[error("cannot aggregate an empty signature set")]
    EmptyAggregate,

    /// Key generation failed (insufficient or rejected key material).
    #[error("key generation failed")]
    KeyGen,
}
