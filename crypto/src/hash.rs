use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output width of the `H` role. 32 bytes keeps block/transaction hashes the
/// same size as the Ed25519 public keys they're often hashed alongside.
pub const HASH_LEN: usize = 32;

type Blake2b256 = Blake2b<blake2::digest::consts::U32>;

/// The `H` role: a 256-bit Blake2b digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(#[serde(with = "serde_bytes_array")] pub [u8; HASH_LEN]);

/// Namespace marker so `H` is never called without naming what's being hashed;
/// mirrors the teacher's habit of domain-separating hash inputs.
pub struct H;

impl H {
    pub fn digest(parts: &[&[u8]]) -> Hash {
        let mut hasher = Blake2b256::new();
        for part in parts {
            hasher.update(part);
        }
        let out = hasher.finalize();
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&out);
        Hash(bytes)
    }

    pub fn digest_one(data: &[u8]) -> Hash {
        Self::digest(&[data])
    }
}

impl Hash {
    pub const fn zero() -> Self {
        Hash([0u8; HASH_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; HASH_LEN] = bytes.try_into().map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        bytes.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = H::digest(&[b"height=1", b"prev=abc"]);
        let b = H::digest(&[b"height=1", b"prev=abc"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_produce_different_digests() {
        let a = H::digest_one(b"block-1");
        let b = H::digest_one(b"block-2");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips_through_display() {
        let h = H::digest_one(b"genesis");
        assert_eq!(h.to_hex().len(), HASH_LEN * 2);
    }
}
