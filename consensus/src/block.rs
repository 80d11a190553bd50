//! Block hashing and the minimal header view the round consumes.
//!
//! Block bytes are opaque to the consensus core. The only structure the
//! round imposes is the canonical content hash: Keccak-256 over the block's
//! serialized bytes.

use {
    serde::{Deserialize, Serialize},
    sha3::{Digest, Keccak256},
    std::fmt,
};

/// Length of a block content hash in bytes.
pub const BLOCK_HASH_BYTES: usize = 32;

/// Keccak-256 content hash of a block's canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; BLOCK_HASH_BYTES]);

impl BlockHash {
    /// Borrow the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_BYTES] {
        &self.0
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", hex_prefix(&self.0))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_prefix(&self.0))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(16);
    for b in &bytes[..8] {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Compute the canonical content hash of a block's bytes.
pub fn hash_block(bytes: &[u8]) -> BlockHash {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    BlockHash(hasher.finalize().into())
}

/// Minimal chain-head view a validator may consult when handling an
/// announce. The round never decodes block bytes; anything deeper than
/// (hash, height) belongs to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Content hash of the head block.
    pub hash: BlockHash,
    /// Height of the head block.
    pub height: u64,
}
