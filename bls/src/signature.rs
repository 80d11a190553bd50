//! Signing, verification, and signature aggregation.
//!
//! All operations hash to G2 under the protocol [`DST`](crate::DST).
//! Aggregation is plain point addition, so it is order independent; the
//! aggregate of a signer subset verifies against exactly that subset's
//! public keys and no other.

use {
    crate::{error::BlsError, keypair::BlsPublicKey, keypair::BlsSecretKey, DST},
    blst::{min_pk, BLST_ERROR},
    serde::{
        de::{self, Visitor},
        Deserialize, Deserializer, Serialize, Serializer,
    },
    std::fmt,
};

/// Length of a compressed G2 signature in bytes.
pub const SIGNATURE_BYTES: usize = 96;

/// A BLS signature (96-byte compressed G2 point). Individual and aggregate
/// signatures share this representation; an aggregate is only meaningful
/// next to the bitmap naming its signers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature(pub(crate) [u8; SIGNATURE_BYTES]);

impl BlsSignature {
    /// Parse a signature from its 96-byte compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlsError> {
        let sig = min_pk::Signature::from_bytes(bytes).map_err(|_| BlsError::InvalidSignature)?;
        Ok(Self(sig.to_bytes()))
    }

    /// Return the 96-byte compressed encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_BYTES] {
        self.0
    }

    /// Borrow the compressed encoding.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }

    fn parse(&self) -> Result<min_pk::Signature, BlsError> {
        min_pk::Signature::from_bytes(&self.0).map_err(|_| BlsError::InvalidSignature)
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({})", hex::encode(&self.0[..8]))
    }
}

/// Sign `msg` with `sk` under the protocol domain-separation tag.
pub fn sign(sk: &BlsSecretKey, msg: &[u8]) -> BlsSignature {
    BlsSignature(sk.parsed().sign(msg, DST, &[]).to_bytes())
}

/// Verify an individual signature. Returns `false` for malformed
/// encodings as well as honest verification failures.
pub fn verify(pk: &BlsPublicKey, msg: &[u8], sig: &BlsSignature) -> bool {
    let (Ok(pk), Ok(sig)) = (pk.parse(), sig.parse()) else {
        return false;
    };
    sig.verify(true, msg, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}

/// Aggregate individual signatures into one. Order independent; the empty
/// set is an error.
pub fn aggregate(sigs: &[BlsSignature]) -> Result<BlsSignature, BlsError> {
    if sigs.is_empty() {
        return Err(BlsError::EmptyAggregate);
    }
    let parsed: Vec<min_pk::Signature> = sigs
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&min_pk::Signature> = parsed.iter().collect();
    let agg = min_pk::AggregateSignature::aggregate(&refs, true)
        .map_err(|_| BlsError::InvalidSignature)?;
    Ok(BlsSignature(agg.to_signature().to_bytes()))
}

/// Verify that `agg` is a joint signature over `msg` by all of `pks`.
///
/// The caller selects `pks` from the roster via the bitmap that travels
/// with the aggregate. Empty key sets, malformed points, and honest
/// verification failures all return `false`.
pub fn verify_aggregate(agg: &BlsSignature, msg: &[u8], pks: &[BlsPublicKey]) -> bool {
    if pks.is_empty() {
        return false;
    }
    let Ok(sig) = agg.parse() else {
        return false;
    };
    let parsed: Vec<min_pk::PublicKey> = match pks.iter().map(|pk| pk.parse()).collect() {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    let refs: Vec<&min_pk::PublicKey> = parsed.iter().collect();
    let Ok(joint) = min_pk::AggregatePublicKey::aggregate(&refs, false) else {
        return false;
    };
    sig.verify(true, msg, DST, &[], &joint.to_public_key(), false) == BLST_ERROR::BLST_SUCCESS
}

impl Serialize for BlsSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlsSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SigVisitor;
        impl<'de> Visitor<'de> for SigVisitor {
            type Value = BlsSignature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 96-byte compressed BLS signature")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.len() != SIGNATURE_BYTES {
                    return Err(E::custom(format!(
                        "expected {SIGNATURE_BYTES} bytes, got {}",
                        v.len()
                    )));
                }
                let mut arr = [0u8; SIGNATURE_BYTES];
                arr.copy_from_slice(v);
                Ok(BlsSignature(arr))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut arr = [0u8; SIGNATURE_BYTES];
                for (i, item) in arr.iter_mut().enumerate() {
                    *item = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(BlsSignature(arr))
            }
        }
        deserializer.deserialize_bytes(SigVisitor)
    }
}
