//! BLS12-381 signing and aggregation for Meridian consensus.
//!
//! Thin, byte-oriented wrappers over `blst` in the min-pk configuration:
//! public keys are 48-byte compressed G1 points, signatures are 96-byte
//! compressed G2 points. The consensus round only needs four operations
//! (sign, verify, aggregate, verify-aggregate), and all of them hash to
//! the curve under a single protocol domain-separation tag. Phase separation
//! comes from the signed payload itself (the prepare phase signs the block
//! hash, the commit phase signs the sealed prepare aggregate and bitmap),
//! so signatures can never cross-verify between phases.
//!
//! The wrapper types hold raw compressed bytes and parse into curve points
//! on use. This keeps them `Eq`/`Hash`-able map keys, makes serialization
//! trivial, and defers the (cheap) group checks to the verification sites
//! that need them.

pub mod error;
pub mod keypair;
pub mod signature;

pub use error::BlsError;
pub use keypair::{BlsPublicKey, BlsSecretKey, PUBLIC_KEY_BYTES, SECRET_KEY_BYTES};
pub use signature::{aggregate, sign, verify, verify_aggregate, BlsSignature, SIGNATURE_BYTES};

/// Domain-separation tag for every BLS operation in the Meridian consensus
/// protocol. Uses the ciphersuite format of RFC 9380 §8.8.
pub const DST: &[u8] = b"MERIDIAN_BFT_BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Convenience result type for BLS operations.
pub type Result<T> = std::result::Result<T, BlsError>;
