//! The validator roster for a consensus round.
//!
//! An ordered, frozen set of BLS public keys. A validator's position in the
//! roster is its [`ValidatorId`]; bitmaps index into the same order. The
//! roster is shared read-only across the round (and across rounds, until a
//! membership change produces a new one).

use {
    crate::{
        bitmap::Bitmap,
        error::{ConsensusError, Result},
    },
    meridian_bls::BlsPublicKey,
    std::collections::HashMap,
};

/// Stable index of a validator within the roster (0..N-1).
pub type ValidatorId = u32;

/// An ordered roster of validator public keys, frozen for the round.
#[derive(Debug, Clone)]
pub struct Roster {
    /// Validators in canonical order; position == ValidatorId.
    validators: Vec<BlsPublicKey>,
    /// Reverse lookup from public key to roster position.
    index: HashMap<BlsPublicKey, ValidatorId>,
}

impl Roster {
    /// Build a roster from an ordered list of public keys. The order is
    /// canonical and must be identical on every node. Duplicate keys keep
    /// their first position.
    pub fn new(validators: Vec<BlsPublicKey>) -> Self {
        let mut index = HashMap::with_capacity(validators.len());
        for (position, pubkey) in validators.iter().enumerate() {
            index.entry(*pubkey).or_insert(position as ValidatorId);
        }
        Self { validators, index }
    }

    /// Number of validators N.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Quorum threshold T = ⌊2N/3⌋ + 1.
    pub fn threshold(&self) -> usize {
        (self.validators.len().saturating_mul(2) / 3).saturating_add(1)
    }

    /// Whether the given key is a roster member.
    pub fn contains(&self, pubkey: &BlsPublicKey) -> bool {
        self.index.contains_key(pubkey)
    }

    /// Roster position of the given key.
    pub fn id_of(&self, pubkey: &BlsPublicKey) -> Option<ValidatorId> {
        self.index.get(pubkey).copied()
    }

    /// Public key at the given roster position.
    pub fn pubkey_of(&self, id: ValidatorId) -> Option<&BlsPublicKey> {
        self.validators.get(id as usize)
    }

    /// Iterate over (id, pubkey) pairs in roster order.
    pub fn iter(&self) -> impl Iterator<Item = (ValidatorId, &BlsPublicKey)> {
        self.validators
            .iter()
            .enumerate()
            .map(|(position, pubkey)| (position as ValidatorId, pubkey))
    }

    /// The ordered subset of public keys selected by a bitmap. The bitmap
    /// width must equal the roster size.
    pub fn pubkeys_from_bitmap(&self, bitmap: &Bitmap) -> Result<Vec<BlsPublicKey>> {
        if bitmap.width() != self.len() {
            return Err(ConsensusError::BadBitmap(format!(
                "bitmap width {} does not match roster size {}",
                bitmap.width(),
                self.len()
            )));
        }
        Ok(bitmap
            .iter_ones()
            .filter_map(|position| self.validators.get(position).copied())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, meridian_bls::BlsSecretKey};

    fn make_pubkeys(n: usize) -> Vec<BlsPublicKey> {
        (0..n).map(|_| BlsSecretKey::random().public_key()).collect()
    }

    #[test]
    fn test_threshold_values() {
        for (n, t) in [(1, 1), (3, 3), (4, 3), (7, 5), (9, 7), (10, 7)] {
            let roster = Roster::new(make_pubkeys(n));
            assert_eq!(roster.threshold(), t, "N={n}");
        }
    }

    #[test]
    fn test_id_lookup_roundtrip() {
        let pks = make_pubkeys(4);
        let roster = Roster::new(pks.clone());
        for (id, pk) in pks.iter().enumerate() {
            assert_eq!(roster.id_of(pk), Some(id as ValidatorId));
            assert_eq!(roster.pubkey_of(id as ValidatorId), Some(pk));
        }
        assert_eq!(roster.pubkey_of(4), None);
        assert!(!roster.contains(&BlsSecretKey::random().public_key()));
    }

    #[test]
    fn test_pubkeys_from_bitmap_ordered_subset() {
        let pks = make_pubkeys(5);
        let roster = Roster::new(pks.clone());
        let mut bitmap = Bitmap::new(5);
        bitmap.set(3).unwrap();
        bitmap.set(0).unwrap();
        let selected = roster.pubkeys_from_bitmap(&bitmap).unwrap();
        assert_eq!(selected, vec![pks[0], pks[3]]);
    }

    #[test]
    fn test_pubkeys_from_bitmap_width_mismatch() {
        let roster = Roster::new(make_pubkeys(4));
        let bitmap = Bitmap::new(5);
        assert!(roster.pubkeys_from_bitmap(&bitmap).is_err());
    }

    #[test]
    fn test_iter_order() {
        let pks = make_pubkeys(3);
        let roster = Roster::new(pks.clone());
        let collected: Vec<_> = roster.iter().map(|(id, pk)| (id, *pk)).collect();
        assert_eq!(
            collected,
            vec![(0, pks[0]), (1, pks[1]), (2, pks[2])]
        );
    }
}
