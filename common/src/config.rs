use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("failed to write default configuration to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Consensus (rPoS) policy — §6 "Consensus" group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConsensusConfig {
    pub block_time_secs: u64,
    pub min_validators: usize,
    pub finalization_threshold: f64,
    pub block_proposal_timeout_secs: u64,
    pub voting_timeout_secs: u64,
    pub missed_blocks_before_jail: u32,
    pub jail_time_blocks: u64,
    pub slashing_penalty: f64,
    pub max_round: u32,
    /// `minStake` (§3 Validator invariants): the floor `register`/`activate`
    /// enforce before a validator is eligible to become `Active`.
    pub min_validator_stake: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            block_time_secs: 10,
            min_validators: 1,
            finalization_threshold: 2.0 / 3.0,
            block_proposal_timeout_secs: 4,
            voting_timeout_secs: 3,
            missed_blocks_before_jail: 50,
            jail_time_blocks: 100,
            slashing_penalty: 0.01,
            max_round: 32,
            min_validator_stake: 100,
        }
    }
}

/// Peer-pool policy — §6 "Network" group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NetworkConfig {
    pub max_peers: usize,
    pub min_peers: usize,
    pub port: u16,
    pub seed_nodes: Vec<String>,
    pub validator_priority: bool,
    pub peer_discovery_interval_secs: u64,
    pub peer_ping_interval_secs: u64,
    pub handshake_timeout_secs: u64,
    pub punch_timeout_ms: u64,
    pub max_relayed_messages_per_min: u32,
    pub relay_message_expiry_secs: u64,
    pub relay_cleanup_interval_secs: u64,
    /// STUN server for external-address discovery (§4.4). NAT traversal and
    /// hole-punching still run without one; this only enables the
    /// self-discovery step.
    pub stun_server: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            max_peers: 50,
            min_peers: 8,
            port: 9944,
            seed_nodes: Vec::new(),
            validator_priority: true,
            peer_discovery_interval_secs: 60,
            peer_ping_interval_secs: 30,
            handshake_timeout_secs: 5,
            punch_timeout_ms: 5_000,
            max_relayed_messages_per_min: 120,
            relay_message_expiry_secs: 300,
            relay_cleanup_interval_secs: 60,
            stun_server: None,
        }
    }
}

/// Pending-transaction-pool limits — §6 "Mempool" group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MempoolConfig {
    pub max_transactions: usize,
    pub max_size_bytes: u64,
    pub expiration_time_secs: u64,
    pub cleanup_interval_secs: u64,
    pub persistence_interval_secs: u64,
    pub redis_url: Option<String>,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_transactions: 5_000,
            max_size_bytes: 32 * 1024 * 1024,
            expiration_time_secs: 3 * 3600,
            cleanup_interval_secs: 60,
            persistence_interval_secs: 30,
            redis_url: None,
        }
    }
}

/// Ledger policy — §6 "Storage" group, plus the reward-schedule constants
/// implied by §4.6 (halving interval is named there but has no home in the
/// original config table; it is ledger policy, so it lives here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub checkpoint_interval: u64,
    pub prune_after_blocks: Option<u64>,
    pub snapshot_interval: u64,
    pub checkpoints_to_keep: usize,
    pub halving_interval_blocks: u64,
    pub initial_reward: f64,
    pub max_supply: f64,
    pub block_size_limit_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
            checkpoint_interval: 100,
            prune_after_blocks: None,
            snapshot_interval: 1000,
            checkpoints_to_keep: 10,
            halving_interval_blocks: 100,
            initial_reward: 21.0,
            max_supply: 21_000_000.0,
            block_size_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Genesis/early-validator bonuses — §6 "Distribution" group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DistributionConfig {
    pub distribution_period_days: u64,
    pub developer_reward: u64,
    pub validator_reward: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        DistributionConfig {
            distribution_period_days: 90,
            developer_reward: 100,
            validator_reward: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub mempool: MempoolConfig,
    pub storage: StorageConfig,
    pub distribution: DistributionConfig,
}

impl NodeConfig {
    /// Loads configuration layered file-then-env-then-caller-overrides, as
    /// `tari_common` does with its `config` crate pipeline. Unknown keys in
    /// the TOML file are a startup error because every sub-config denies
    /// unknown fields.
    pub fn load(path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("EMBER")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder.build()?;
        let cfg: NodeConfig = raw.try_deserialize()?;
        Ok(cfg)
    }

    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let cfg = NodeConfig::default();
        let toml = toml::to_string_pretty(&cfg).expect("NodeConfig always serializes");
        std::fs::write(path, toml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = NodeConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let back: NodeConfig = toml::from_str(&toml).unwrap();
        assert_eq!(cfg.consensus.block_time_secs, back.consensus.block_time_secs);
        assert_eq!(cfg.storage.halving_interval_blocks, back.storage.halving_interval_blocks);
    }

    #[test]
    fn unknown_key_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[consensus]\nblock_time_secs = 10\nbogus_field = 1\n").unwrap();
        let result = NodeConfig::load(Some(&path));
        assert!(result.is_err());
    }

    #[test]
    fn env_override_takes_effect() {
        std::env::set_var("EMBER_CONSENSUS__BLOCK_TIME_SECS", "42");
        let cfg = NodeConfig::load(None).unwrap();
        std::env::remove_var("EMBER_CONSENSUS__BLOCK_TIME_SECS");
        assert_eq!(cfg.consensus.block_time_secs, 42);
    }
}
