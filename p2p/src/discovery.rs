use crate::store::PeerStore;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, warn};

const LOG_TARGET: &str = "ember::p2p::discovery";

const PROBE_BATCH_SIZE: usize = 5;
const MIN_REACHABLE: usize = 5;

pub struct DiscoveryConfig {
    pub hardcoded_seeds: Vec<SocketAddr>,
    pub dns_seeds: Vec<String>,
    pub default_port: u16,
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            hardcoded_seeds: Vec::new(),
            dns_seeds: Vec::new(),
            default_port: 7654,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// §4.2 SeedDiscovery: hardcoded seeds, then DNS A-records, then last-known
/// good peers, probed in batches until enough reachable addresses are found.
pub struct SeedDiscovery {
    config: DiscoveryConfig,
}

impl SeedDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        SeedDiscovery { config }
    }

    async fn resolve_dns_seeds(&self) -> Vec<SocketAddr> {
        let mut addrs = Vec::new();
        for seed in &self.config.dns_seeds {
            let host = format!("{seed}:{}", self.config.default_port);
            match lookup_host(&host).await {
                Ok(resolved) => addrs.extend(resolved),
                Err(err) => warn!(target: LOG_TARGET, %seed, %err, "dns seed lookup failed"),
            }
        }
        addrs
    }

    async fn probe(addr: SocketAddr, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await.map(|r| r.is_ok()).unwrap_or(false)
    }

    /// Produces a deduplicated list of reachable addresses, stopping once
    /// at least [`MIN_REACHABLE`] have been confirmed.
    pub async fn discover(&self, store: &PeerStore, now: u64) -> Vec<SocketAddr> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<SocketAddr> = Vec::new();
        for addr in &self.config.hardcoded_seeds {
            if seen.insert(*addr) {
                candidates.push(*addr);
            }
        }
        for addr in self.resolve_dns_seeds().await {
            if seen.insert(addr) {
                candidates.push(addr);
            }
        }
        for record in store.good_peers(now, store.expiry_days()) {
            if seen.insert(record.address) {
                candidates.push(record.address);
            }
        }

        let mut reachable = Vec::new();
        for batch in candidates.chunks(PROBE_BATCH_SIZE) {
            if reachable.len() >= MIN_REACHABLE {
                break;
            }
            let probes = batch.iter().map(|addr| Self::probe(*addr, self.config.probe_timeout));
            let results = futures::future::join_all(probes).await;
            for (addr, ok) in batch.iter().zip(results) {
                if ok {
                    debug!(target: LOG_TARGET, %addr, "seed reachable");
                    reachable.push(*addr);
                }
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;

    #[tokio::test]
    async fn discover_with_no_seeds_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PeerStore::open(StoreConfig {
            path: dir.path().join("peers.dat"),
            ..StoreConfig::default()
        })
        .unwrap();
        let discovery = SeedDiscovery::new(DiscoveryConfig::default());
        let found = discovery.discover(&store, 1_700_000_000).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn unreachable_hardcoded_seed_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = PeerStore::open(StoreConfig {
            path: dir.path().join("peers.dat"),
            ..StoreConfig::default()
        })
        .unwrap();
        let discovery = SeedDiscovery::new(DiscoveryConfig {
            hardcoded_seeds: vec!["127.0.0.1:1".parse().unwrap()],
            probe_timeout: Duration::from_millis(100),
            ..DiscoveryConfig::default()
        });
        let found = discovery.discover(&store, 1_700_000_000).await;
        assert!(found.is_empty());
    }
}
