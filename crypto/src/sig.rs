use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("malformed key or signature bytes: {0}")]
    Malformed(String),
}

/// The `SIG` role: Ed25519 signatures over canonically-encoded messages.
pub struct SIG;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "pk_bytes")] [u8; 32]);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "sig_bytes")] [u8; 64]);

pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        KeyPair {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        KeyPair {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// The 32-byte seed, for persisting a node's identity to disk.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl SIG {
    pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), SigError> {
        let verifying_key =
            VerifyingKey::from_bytes(&public.0).map_err(|e| SigError::Malformed(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| SigError::InvalidSignature)
    }
}

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, SigError> {
        let bytes = hex::decode(s).map_err(|e| SigError::Malformed(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| SigError::Malformed(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(PublicKey(bytes))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = SigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

mod pk_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(b: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        b.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

mod sig_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(b: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        b.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let kp = KeyPair::generate();
        let msg = b"height=1|prev=abc";
        let sig = kp.sign(msg);
        assert!(SIG::verify(&kp.public(), msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(SIG::verify(&kp.public(), b"tampered", &sig).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp_a = KeyPair::generate();
        let kp_b = KeyPair::generate();
        let sig = kp_a.sign(b"message");
        assert!(SIG::verify(&kp_b.public(), b"message", &sig).is_err());
    }

    #[test]
    fn public_key_hex_round_trips() {
        let kp = KeyPair::generate();
        let hex = kp.public().to_hex();
        let parsed: PublicKey = hex.parse().unwrap();
        assert_eq!(kp.public(), parsed);
    }

    #[test]
    fn keypair_bytes_round_trip_to_the_same_identity() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_bytes(&kp.to_bytes());
        assert_eq!(kp.public(), restored.public());
    }
}
