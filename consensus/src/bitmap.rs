//! Fixed-width signer bitmaps.
//!
//! A bitmap travels with every aggregate signature and names exactly the
//! roster positions whose individual signatures were folded in. Width is
//! always the roster size N; the wire form is ⌈N/8⌉ bytes, MSB-first within
//! each byte, and any trailing bits past N must be zero.

use {
    crate::error::{ConsensusError, Result},
    bitvec::prelude::*,
};

/// A bit array of fixed width N marking contributing roster positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: BitVec<u8, Msb0>,
}

impl Bitmap {
    /// Create an all-zero bitmap of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, width),
        }
    }

    /// Width of the bitmap in bits (the roster size N).
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Mark position `index`.
    pub fn set(&mut self, index: usize) -> Result<()> {
        if index >= self.bits.len() {
            return Err(ConsensusError::BadBitmap(format!(
                "index {index} out of range for width {}",
                self.bits.len()
            )));
        }
        self.bits.set(index, true);
        Ok(())
    }

    /// Whether position `index` is marked. Out-of-range reads are false.
    pub fn test(&self, index: usize) -> bool {
        self.bits.get(index).is_some_and(|bit| *bit)
    }

    /// Number of marked positions.
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Fold another bitmap of the same width into this one.
    pub fn union(&mut self, other: &Bitmap) -> Result<()> {
        if other.width() != self.width() {
            return Err(ConsensusError::BadBitmap(format!(
                "union width mismatch: {} vs {}",
                self.width(),
                other.width()
            )));
        }
        for index in other.bits.iter_ones() {
            self.bits.set(index, true);
        }
        Ok(())
    }

    /// Iterate over marked positions in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    /// Serialize to ⌈N/8⌉ bytes, MSB-first per byte, trailing bits zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);
        bits.into_vec()
    }

    /// Deserialize a bitmap of known width. Rejects wrong byte counts and
    /// nonzero trailing bits.
    pub fn from_bytes(bytes: &[u8], width: usize) -> Result<Self> {
        let expected = width.div_ceil(8);
        if bytes.len() != expected {
            return Err(ConsensusError::BadBitmap(format!(
                "expected {expected} bytes for width {width}, got {}",
                bytes.len()
            )));
        }
        let mut bits = BitVec::<u8, Msb0>::from_slice(bytes);
        if bits[width..].any() {
            return Err(ConsensusError::BadBitmap(
                "nonzero trailing bits".to_string(),
            ));
        }
        bits.truncate(width);
        Ok(Self { bits })
    }
}
