use crate::message::{Frame, MessageType};
use ember_crypto::{PeerID, Hash, H};
use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;
use tracing::debug;

const LOG_TARGET: &str = "ember::p2p::gossip";

const MAX_DEDUP_ENTRIES: usize = 50_000;

/// §4.1 "Broadcast uses the current `Connected` set; `exclude` suppresses
/// the originating peer (simple loop suppression — messages carry a dedup
/// key the receiver also checks)". Frames don't carry an explicit key field
/// on the wire (§6), so the dedup key is derived by hashing `(type, data)`;
/// two distinct frames with the same type and payload are indistinguishable
/// gossip anyway.
pub struct GossipRouter {
    seen: RwLock<HashSet<Hash>>,
    order: RwLock<VecDeque<Hash>>,
}

impl GossipRouter {
    pub fn new() -> Self {
        GossipRouter {
            seen: RwLock::new(HashSet::new()),
            order: RwLock::new(VecDeque::new()),
        }
    }

    pub fn dedup_key(frame: &Frame) -> Hash {
        let type_tag = bincode::serialize(&frame.message_type).unwrap_or_default();
        H::digest(&[&type_tag, &frame.data])
    }

    /// §8 property 8: "Any message id is delivered to the application layer
    /// at most once per node." Returns `true` the first time a key is seen.
    pub fn should_deliver(&self, key: Hash) -> bool {
        {
            let seen = self.seen.read().unwrap();
            if seen.contains(&key) {
                return false;
            }
        }
        let mut seen = self.seen.write().unwrap();
        if !seen.insert(key) {
            return false;
        }
        let mut order = self.order.write().unwrap();
        order.push_back(key);
        if order.len() > MAX_DEDUP_ENTRIES {
            if let Some(oldest) = order.pop_front() {
                seen.remove(&oldest);
            }
        }
        true
    }

    /// Gossip message types that should be re-broadcast to other peers once
    /// accepted locally, as opposed to request/response types like
    /// `GET_BLOCKS`/`BLOCKS` which are point-to-point.
    pub fn is_floodable(message_type: MessageType) -> bool {
        matches!(
            message_type,
            MessageType::NewBlock | MessageType::NewTransaction | MessageType::ValidatorUpdate
        )
    }
}

impl Default for GossipRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded gossip frame plus the peer it arrived from, handed to the
/// Integrator for translation into subsystem calls (§4.9).
#[derive(Debug)]
pub struct GossipMessage {
    pub from: PeerID,
    pub frame: Frame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_are_delivered_once() {
        let router = GossipRouter::new();
        let frame = Frame::new(MessageType::NewTransaction, vec![1, 2, 3]);
        let key = GossipRouter::dedup_key(&frame);
        assert!(router.should_deliver(key));
        assert!(!router.should_deliver(key));
    }

    #[test]
    fn distinct_payloads_both_deliver() {
        let router = GossipRouter::new();
        let a = Frame::new(MessageType::NewTransaction, vec![1]);
        let b = Frame::new(MessageType::NewTransaction, vec![2]);
        assert!(router.should_deliver(GossipRouter::dedup_key(&a)));
        assert!(router.should_deliver(GossipRouter::dedup_key(&b)));
    }

    #[test]
    fn request_response_types_are_not_floodable() {
        assert!(!GossipRouter::is_floodable(MessageType::GetBlocks));
        assert!(GossipRouter::is_floodable(MessageType::NewBlock));
    }
}
