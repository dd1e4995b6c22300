use crate::error::RelayError;
use ember_crypto::PeerID;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::info;

const LOG_TARGET: &str = "ember::p2p::relay";

const MAX_DELIVERED_IDS: usize = 10_000;
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct RelayedMessage {
    pub id: u64,
    pub src: PeerID,
    pub dst: PeerID,
    pub payload: Vec<u8>,
    pub encrypted: bool,
    pub ttl: u8,
    pub ts: u64,
}

pub struct RelayConfig {
    pub max_relayed_per_minute: u32,
    pub message_expiry_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            max_relayed_per_minute: 120,
            message_expiry_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}

struct RateWindow {
    minute_bucket: u64,
    count: u32,
}

/// §4.4 MessageRelay: store-and-forward for peers that can't be reached
/// directly, with per-relay rate limiting, TTL decrement, and dedup.
pub struct MessageRelay {
    config: RelayConfig,
    pending: RwLock<HashMap<PeerID, VecDeque<RelayedMessage>>>,
    delivered_ids: RwLock<VecDeque<u64>>,
    delivered_set: RwLock<HashSet<u64>>,
    public_keys: RwLock<HashMap<PeerID, Vec<u8>>>,
    rate: RwLock<RateWindow>,
    last_seen: RwLock<HashMap<PeerID, u64>>,
    next_id: AtomicU64,
}

impl MessageRelay {
    pub fn new(config: RelayConfig) -> Self {
        MessageRelay {
            config,
            pending: RwLock::new(HashMap::new()),
            delivered_ids: RwLock::new(VecDeque::new()),
            delivered_set: RwLock::new(HashSet::new()),
            public_keys: RwLock::new(HashMap::new()),
            rate: RwLock::new(RateWindow {
                minute_bucket: 0,
                count: 0,
            }),
            last_seen: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out a fresh dedup id for a message this node is originating,
    /// so callers don't need their own id scheme for `relay`.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_public_key(&self, peer: PeerID, public_key: Vec<u8>) {
        self.public_keys.write().unwrap().insert(peer, public_key);
    }

    fn check_rate_limit(&self, now: u64) -> Result<(), RelayError> {
        let minute = now / 60;
        let mut rate = self.rate.write().unwrap();
        if rate.minute_bucket != minute {
            rate.minute_bucket = minute;
            rate.count = 0;
        }
        if rate.count >= self.config.max_relayed_per_minute {
            return Err(RelayError::Overloaded);
        }
        rate.count += 1;
        Ok(())
    }

    /// Accepts `message` for store-and-forward delivery to `message.dst`.
    pub fn relay(&self, mut message: RelayedMessage, now: u64) -> Result<(), RelayError> {
        self.check_rate_limit(now)?;
        if message.ttl == 0 {
            return Err(RelayError::TtlExpired);
        }
        if message.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(RelayError::PayloadTooLarge);
        }
        {
            let mut delivered_set = self.delivered_set.write().unwrap();
            if delivered_set.contains(&message.id) {
                return Err(RelayError::Duplicate);
            }
            let mut delivered_ids = self.delivered_ids.write().unwrap();
            delivered_ids.push_back(message.id);
            delivered_set.insert(message.id);
            if delivered_ids.len() > MAX_DELIVERED_IDS {
                if let Some(oldest) = delivered_ids.pop_front() {
                    delivered_set.remove(&oldest);
                }
            }
        }
        message.ttl -= 1;
        self.pending.write().unwrap().entry(message.dst).or_default().push_back(message);
        Ok(())
    }

    /// Drains queued messages addressed to `peer`, e.g. once it reconnects.
    pub fn take_pending(&self, peer: &PeerID) -> Vec<RelayedMessage> {
        self.pending.write().unwrap().remove(peer).map(|q| q.into_iter().collect()).unwrap_or_default()
    }

    pub fn note_seen(&self, peer: PeerID, now: u64) {
        self.last_seen.write().unwrap().insert(peer, now);
    }

    /// Cleanup sweep: expires queued messages past `messageExpiry` and
    /// drops peers unseen for `3 * cleanupInterval`.
    pub fn cleanup(&self, now: u64) {
        let expiry = self.config.message_expiry_secs;
        let mut pending = self.pending.write().unwrap();
        let mut dropped_messages = 0usize;
        pending.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|m| now.saturating_sub(m.ts) <= expiry);
            dropped_messages += before - queue.len();
            !queue.is_empty()
        });

        let stale_after = 3 * self.config.cleanup_interval_secs;
        let mut last_seen = self.last_seen.write().unwrap();
        let stale: Vec<PeerID> = last_seen
            .iter()
            .filter(|(_, &seen)| now.saturating_sub(seen) > stale_after)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in &stale {
            last_seen.remove(peer);
            pending.remove(peer);
        }
        if dropped_messages > 0 || !stale.is_empty() {
            info!(target: LOG_TARGET, dropped_messages, dropped_peers = stale.len(), "relay cleanup sweep completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, dst: PeerID, ttl: u8, ts: u64) -> RelayedMessage {
        RelayedMessage {
            id,
            src: PeerID::random(),
            dst,
            payload: vec![1, 2, 3],
            encrypted: false,
            ttl,
            ts,
        }
    }

    #[test]
    fn expired_ttl_is_rejected() {
        let relay = MessageRelay::new(RelayConfig::default());
        let dst = PeerID::random();
        assert_eq!(relay.relay(msg(1, dst, 0, 0), 0), Err(RelayError::TtlExpired));
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let relay = MessageRelay::new(RelayConfig::default());
        let dst = PeerID::random();
        relay.relay(msg(1, dst, 5, 0), 0).unwrap();
        assert_eq!(relay.relay(msg(1, dst, 5, 0), 0), Err(RelayError::Duplicate));
    }

    #[test]
    fn rate_limit_rejects_once_bucket_is_exhausted() {
        let relay = MessageRelay::new(RelayConfig {
            max_relayed_per_minute: 2,
            ..RelayConfig::default()
        });
        let dst = PeerID::random();
        relay.relay(msg(1, dst, 5, 0), 0).unwrap();
        relay.relay(msg(2, dst, 5, 0), 0).unwrap();
        assert_eq!(relay.relay(msg(3, dst, 5, 0), 0), Err(RelayError::Overloaded));
    }

    #[test]
    fn take_pending_drains_queued_messages_for_a_peer() {
        let relay = MessageRelay::new(RelayConfig::default());
        let dst = PeerID::random();
        relay.relay(msg(1, dst, 5, 0), 0).unwrap();
        let drained = relay.take_pending(&dst);
        assert_eq!(drained.len(), 1);
        assert!(relay.take_pending(&dst).is_empty());
    }

    #[test]
    fn cleanup_drops_expired_messages() {
        let relay = MessageRelay::new(RelayConfig {
            message_expiry_secs: 10,
            ..RelayConfig::default()
        });
        let dst = PeerID::random();
        relay.relay(msg(1, dst, 5, 0), 0).unwrap();
        relay.cleanup(100);
        assert!(relay.take_pending(&dst).is_empty());
    }
}
