use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

const LOG_TARGET: &str = "ember::p2p::store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerRecordServices {
    pub is_validator: bool,
}

/// The durable `{address, lastSeen, score, services}` entry (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: SocketAddr,
    pub last_seen: u64,
    pub score: f64,
    pub services: PeerRecordServices,
}

pub struct StoreConfig {
    pub path: PathBuf,
    pub max_peers: usize,
    pub peer_expiry_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: PathBuf::from("peers.dat"),
            max_peers: 1000,
            peer_expiry_days: 30,
        }
    }
}

/// §4.2 PeerStore: durable, bounded, rank-evicted known-peer set.
pub struct PeerStore {
    config: StoreConfig,
    peers: RwLock<HashMap<SocketAddr, PeerRecord>>,
}

impl PeerStore {
    pub fn open(config: StoreConfig) -> io::Result<Self> {
        let peers = if config.path.exists() {
            let bytes = std::fs::read(&config.path)?;
            if bytes.is_empty() {
                HashMap::new()
            } else {
                bincode::deserialize::<Vec<PeerRecord>>(&bytes)
                    .map(|records| records.into_iter().map(|r| (r.address, r)).collect())
                    .unwrap_or_else(|err| {
                        warn!(target: LOG_TARGET, %err, "peers.dat unreadable, starting with an empty store");
                        HashMap::new()
                    })
            }
        } else {
            HashMap::new()
        };
        Ok(PeerStore {
            config,
            peers: RwLock::new(peers),
        })
    }

    fn rank(record: &PeerRecord, now: u64) -> f64 {
        let recency = if now == 0 { 0.0 } else { (record.last_seen as f64 / now as f64).min(1.0) };
        0.7 * record.score + 0.3 * recency
    }

    /// Inserts or refreshes a record, evicting the lowest-rank entry if the
    /// store is already at `maxPeers` (§4.2).
    pub fn insert(&self, record: PeerRecord, now: u64) {
        let mut peers = self.peers.write().unwrap();
        if !peers.contains_key(&record.address) && peers.len() >= self.config.max_peers {
            if let Some(evict_addr) = peers
                .values()
                .min_by(|a, b| Self::rank(a, now).partial_cmp(&Self::rank(b, now)).unwrap())
                .map(|r| r.address)
            {
                peers.remove(&evict_addr);
            }
        }
        peers.insert(record.address, record);
    }

    pub fn update_score(&self, address: &SocketAddr, score: f64) {
        if let Some(record) = self.peers.write().unwrap().get_mut(address) {
            record.score = score;
        }
    }

    pub fn touch(&self, address: &SocketAddr, now: u64) {
        if let Some(record) = self.peers.write().unwrap().get_mut(address) {
            record.last_seen = now;
        }
    }

    pub fn remove(&self, address: &SocketAddr) {
        self.peers.write().unwrap().remove(address);
    }

    /// Non-stale peers, ranked best-first; used by discovery and re-seeding.
    pub fn good_peers(&self, now: u64, expiry_days: u64) -> Vec<PeerRecord> {
        let max_age = expiry_days * 86_400;
        let peers = self.peers.read().unwrap();
        let mut good: Vec<PeerRecord> = peers
            .values()
            .filter(|r| now.saturating_sub(r.last_seen) < max_age)
            .cloned()
            .collect();
        good.sort_by(|a, b| Self::rank(b, now).partial_cmp(&Self::rank(a, now)).unwrap());
        good
    }

    pub fn all(&self) -> Vec<PeerRecord> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// §4.2 periodic serialize of the whole set.
    pub fn save(&self) -> io::Result<()> {
        let records: Vec<PeerRecord> = self.all();
        let bytes = bincode::serialize(&records).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config.path, bytes)?;
        info!(target: LOG_TARGET, count = records.len(), "peer store saved");
        Ok(())
    }

    pub fn expiry_days(&self) -> u64 {
        self.config.peer_expiry_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn record(port: u16, score: f64, last_seen: u64) -> PeerRecord {
        PeerRecord {
            address: addr(port),
            last_seen,
            score,
            services: PeerRecordServices::default(),
        }
    }

    #[test]
    fn save_then_open_round_trips_the_peer_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.dat");
        let store = PeerStore::open(StoreConfig {
            path: path.clone(),
            ..StoreConfig::default()
        })
        .unwrap();
        store.insert(record(9000, 10.0, 1_700_000_000), 1_700_000_000);
        store.save().unwrap();

        let reopened = PeerStore::open(StoreConfig {
            path,
            ..StoreConfig::default()
        })
        .unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn insert_over_capacity_evicts_lowest_combined_rank() {
        let dir = tempfile::tempdir().unwrap();
        let store = PeerStore::open(StoreConfig {
            path: dir.path().join("peers.dat"),
            max_peers: 2,
            ..StoreConfig::default()
        })
        .unwrap();
        let now = 1_700_000_000;
        store.insert(record(1, 90.0, now), now);
        store.insert(record(2, -90.0, now), now);
        store.insert(record(3, 50.0, now), now);

        assert_eq!(store.len(), 2);
        assert!(store.all().iter().all(|r| r.address != addr(2)));
    }

    #[test]
    fn good_peers_excludes_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = PeerStore::open(StoreConfig {
            path: dir.path().join("peers.dat"),
            ..StoreConfig::default()
        })
        .unwrap();
        let now = 1_700_000_000;
        store.insert(record(1, 10.0, now), now);
        store.insert(record(2, 10.0, now - 40 * 86_400), now);

        let good = store.good_peers(now, 30);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].address, addr(1));
    }

    proptest::proptest! {
        #[test]
        fn save_then_open_round_trips_arbitrary_sets(
            ports in proptest::collection::vec(1u16..=6535, 1..20),
            scores in proptest::collection::vec(-100f64..100f64, 1..20),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let store = PeerStore::open(StoreConfig {
                path: dir.path().join("peers.dat"),
                max_peers: 10_000,
                ..StoreConfig::default()
            })
            .unwrap();
            let now = 1_700_000_000u64;
            let mut expected: HashMap<SocketAddr, f64> = HashMap::new();
            for (i, port) in ports.iter().enumerate() {
                let score = scores[i % scores.len()];
                store.insert(record(*port, score, now), now);
                expected.insert(addr(*port), score);
            }
            store.save().unwrap();

            let reopened = PeerStore::open(StoreConfig {
                path: dir.path().join("peers.dat"),
                max_peers: 10_000,
                ..StoreConfig::default()
            })
            .unwrap();
            proptest::prop_assert_eq!(reopened.len(), expected.len());
            for record in reopened.all() {
                proptest::prop_assert_eq!(Some(&record.score), expected.get(&record.address));
            }
        }
    }
}
