//! BLS secret and public key wrappers.
//!
//! Keys are stored as raw compressed bytes and parsed by `blst` on use.
//! Only validated byte strings can enter a wrapper: `from_bytes` parses
//! through `blst` and rejects off-curve or malformed encodings.

use {
    crate::error::BlsError,
    blst::min_pk,
    rand::RngCore,
    serde::{
        de::{self, Visitor},
        Deserialize, Deserializer, Serialize, Serializer,
    },
    std::fmt,
};

/// Length of a compressed G1 public key in bytes.
pub const PUBLIC_KEY_BYTES: usize = 48;

/// Length of a secret scalar in bytes.
pub const SECRET_KEY_BYTES: usize = 32;

/// A BLS secret key (32-byte scalar).
#[derive(Clone)]
pub struct BlsSecretKey([u8; SECRET_KEY_BYTES]);

/// A BLS public key (48-byte compressed G1 point).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsPublicKey(pub(crate) [u8; PUBLIC_KEY_BYTES]);

impl BlsSecretKey {
    /// Generate a fresh secret key from OS randomness.
    pub fn random() -> Self {
        let mut ikm = [0u8; 32];
        rand::rng().fill_bytes(&mut ikm);
        let sk = min_pk::SecretKey::key_gen(&ikm, &[])
            .expect("32-byte ikm meets the key_gen minimum");
        Self(sk.to_bytes())
    }

    /// Derive a secret key from caller-provided key material (≥ 32 bytes).
    pub fn from_key_material(ikm: &[u8]) -> Result<Self, BlsError> {
        let sk = min_pk::SecretKey::key_gen(ikm, &[]).map_err(|_| BlsError::KeyGen)?;
        Ok(Self(sk.to_bytes()))
    }

    /// Parse a secret key from its 32-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlsError> {
        let sk = min_pk::SecretKey::from_bytes(bytes).map_err(|_| BlsError::InvalidSecretKey)?;
        Ok(Self(sk.to_bytes()))
    }

    /// Return the 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_BYTES] {
        self.0
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey(self.parsed().sk_to_pk().to_bytes())
    }

    pub(crate) fn parsed(&self) -> min_pk::SecretKey {
        // Wrapper invariant: self.0 came out of a successful blst parse.
        min_pk::SecretKey::from_bytes(&self.0)
            .expect("secret key bytes were validated on construction")
    }
}

impl BlsPublicKey {
    /// Parse a public key from its 48-byte compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlsError> {
        let pk = min_pk::PublicKey::from_bytes(bytes).map_err(|_| BlsError::InvalidPublicKey)?;
        Ok(Self(pk.to_bytes()))
    }

    /// Return the 48-byte compressed encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_BYTES] {
        self.0
    }

    /// Borrow the compressed encoding.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES] {
        &self.0
    }

    pub(crate) fn parse(&self) -> Result<min_pk::PublicKey, BlsError> {
        min_pk::PublicKey::from_bytes(&self.0).map_err(|_| BlsError::InvalidPublicKey)
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSecretKey(***)")
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for BlsPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlsPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PkVisitor;
        impl<'de> Visitor<'de> for PkVisitor {
            type Value = BlsPublicKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 48-byte compressed BLS public key")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.len() != PUBLIC_KEY_BYTES {
                    return Err(E::custom(format!(
                        "expected {PUBLIC_KEY_BYTES} bytes, got {}",
                        v.len()
                    )));
                }
                let mut arr = [0u8; PUBLIC_KEY_BYTES];
                arr.copy_from_slice(v);
                Ok(BlsPublicKey(arr))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut arr = [0u8; PUBLIC_KEY_BYTES];
                for (i, item) in arr.iter_mut().enumerate() {
                    *item = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(BlsPublicKey(arr))
            }
        }
        deserializer.deserialize_bytes(PkVisitor)
    }
}
