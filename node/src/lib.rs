//! Process wiring for the `ember-node` binary (§4.10): configuration
//! loading, node identity, the operational CLI, and assembling the
//! Integrator from a loaded [`NodeConfig`]. The binary's `main.rs` is a
//! thin entrypoint over what's here, matching the teacher's
//! `minotari_node` split between `main.rs` and its application library.

pub mod cli;
pub mod commands;
pub mod identity;

use ember_chain::{BlockchainStore, RewardSchedule, StoreConfig};
use ember_common::config::NodeConfig;
use ember_consensus::ValidatorIdentity;
use ember_crypto::PeerID;
use ember_integrator::{Integrator, IntegratorConfig};
use ember_p2p::TcpTransport;
use ember_shutdown::ShutdownSignal;
use identity::NodeIdentity;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const LOG_TARGET: &str = "ember::node";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ember_chain::StoreError),
    #[error(transparent)]
    Integrator(#[from] ember_integrator::IntegratorError),
    #[error(transparent)]
    Identity(#[from] identity::IdentityError),
    #[error("failed to bind transport on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Height at which the distribution-period bonus window (§4.7) closes,
/// derived from `distributionPeriodDays` and `blockTime` the way the
/// teacher derives block-count windows from wall-clock configuration.
fn distribution_deadline_height(config: &NodeConfig) -> u64 {
    let seconds = config.distribution.distribution_period_days.saturating_mul(86_400);
    seconds / config.consensus.block_time_secs.max(1)
}

/// Builds the chain store and the Integrator from a loaded configuration,
/// optionally running as the given validator identity, and drives the node
/// until `shutdown` resolves. `register_as_validator`, if set, registers
/// (and activates) this node's identity with the given stake on startup —
/// a no-op if it is already known, so it is safe across restarts.
pub async fn run(
    config: NodeConfig,
    identity: Option<NodeIdentity>,
    register_as_validator: Option<(u64, String)>,
    shutdown: ShutdownSignal,
) -> Result<(), NodeError> {
    let chain = Arc::new(BlockchainStore::initialize(StoreConfig {
        data_dir: config.storage.data_dir.clone(),
        block_size_limit: config.storage.block_size_limit_bytes as usize,
        reward_schedule: RewardSchedule::new(
            config.storage.initial_reward,
            config.storage.halving_interval_blocks,
            config.storage.max_supply,
        ),
        checkpoint_interval: config.storage.checkpoint_interval,
        checkpoints_to_keep: config.storage.checkpoints_to_keep,
    })?);
    info!(target: LOG_TARGET, height = ?chain.get_height(), "chain store opened");

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.network.port)
        .parse()
        .expect("formatted socket address always parses");
    let transport = Arc::new(
        TcpTransport::bind(bind_addr)
            .await
            .map_err(|source| NodeError::Bind { addr: bind_addr, source })?,
    );

    let local_address = identity.as_ref().map(|id| id.address());
    let validator_identity = identity.map(|id| {
        let address = id.address();
        ValidatorIdentity { keypair: id.keypair, address }
    });

    let integrator_config = IntegratorConfig {
        consensus: config.consensus.clone(),
        network: config.network.clone(),
        mempool: config.mempool.clone(),
        distribution: config.distribution.clone(),
        data_dir: config.storage.data_dir.clone(),
        local_id: PeerID::random(),
        local_version: 1,
        min_validator_stake: config.consensus.min_validator_stake,
        distribution_deadline_height: distribution_deadline_height(&config),
        block_size_limit: config.storage.block_size_limit_bytes,
    };

    let integrator = Integrator::new(integrator_config, transport, chain, validator_identity)?;
    integrator.restore().await;

    if let Some((stake, moniker)) = register_as_validator {
        let address = local_address.expect("register_as_validator requires a node identity");
        if integrator.validators().get(&address).is_some() {
            info!(target: LOG_TARGET, "validator identity already known, skipping registration");
        } else {
            match integrator.register_validator(address, stake, moniker).await {
                Ok(()) => info!(target: LOG_TARGET, "registered as a validator"),
                Err(err) => info!(target: LOG_TARGET, %err, "validator registration skipped"),
            }
        }
        if let Err(err) = integrator.activate_validator(address).await {
            info!(target: LOG_TARGET, %err, "validator activation skipped");
        }
    }

    info!(target: LOG_TARGET, port = config.network.port, "ember node starting");
    integrator.run(shutdown).await;
    Ok(())
}
