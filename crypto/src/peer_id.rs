use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit random peer identifier (§3 Data Model: Peer).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerID(pub u128);

impl PeerID {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        PeerID(u128::from_be_bytes(bytes))
    }
}

impl fmt::Debug for PeerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerID({:032x})", self.0)
    }
}

impl fmt::Display for PeerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct() {
        let a = PeerID::random();
        let b = PeerID::random();
        assert_ne!(a, b);
    }
}
