//! Node identity persistence: the Ed25519 keypair a node signs blocks and
//! votes with, and (optionally) proposes with as a validator. Loaded once at
//! startup, matching the teacher's `setup_node_identity` step in
//! `minotari_node`'s entrypoint.

use ember_crypto::{KeyPair, PublicKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read identity file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write identity file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("identity file {0} is malformed: {1}")]
    Malformed(PathBuf, String),
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    secret_hex: String,
    moniker: String,
}

/// A node's signing identity plus the human-readable moniker it registers
/// under. Not every node carries one — a full-history observer node runs
/// without a keypair at all.
pub struct NodeIdentity {
    pub keypair: KeyPair,
    pub moniker: String,
}

impl NodeIdentity {
    pub fn address(&self) -> PublicKey {
        self.keypair.public()
    }

    /// Loads `<dataDir>/identity.toml`, creating a fresh keypair and file if
    /// none exists yet — the same "create on first run" behaviour as the
    /// teacher's node identity bootstrap.
    pub fn load_or_create(path: &Path, default_moniker: &str) -> Result<NodeIdentity, IdentityError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| IdentityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let file: IdentityFile = toml::from_str(&contents)
                .map_err(|e| IdentityError::Malformed(path.to_path_buf(), e.to_string()))?;
            let bytes = hex::decode(&file.secret_hex)
                .map_err(|e| IdentityError::Malformed(path.to_path_buf(), e.to_string()))?;
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| IdentityError::Malformed(path.to_path_buf(), "secret is not 32 bytes".to_string()))?;
            Ok(NodeIdentity {
                keypair: KeyPair::from_bytes(&bytes),
                moniker: file.moniker,
            })
        } else {
            let keypair = KeyPair::generate();
            let identity = NodeIdentity {
                keypair,
                moniker: default_moniker.to_string(),
            };
            identity.save(path)?;
            Ok(identity)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IdentityError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let file = IdentityFile {
            secret_hex: hex::encode(self.keypair.to_bytes()),
            moniker: self.moniker.clone(),
        };
        let toml = toml::to_string_pretty(&file).expect("IdentityFile always serializes");
        std::fs::write(path, toml).map_err(|source| IdentityError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_creates_a_stable_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.toml");
        let created = NodeIdentity::load_or_create(&path, "node-a").unwrap();
        let reloaded = NodeIdentity::load_or_create(&path, "node-b").unwrap();
        assert_eq!(created.address(), reloaded.address());
        assert_eq!(reloaded.moniker, "node-a");
    }

    #[test]
    fn malformed_identity_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();
        assert!(NodeIdentity::load_or_create(&path, "node-a").is_err());
    }
}
