//! Shared configuration schema and logging bootstrap used by every Ember
//! crate. Nothing here is subsystem-specific; it is the ambient layer
//! described in `SPEC_FULL.md` §1.2.

pub mod config;
pub mod logging;

pub use config::{
    ConfigError, ConsensusConfig, DistributionConfig, MempoolConfig, NetworkConfig, NodeConfig,
    StorageConfig,
};
