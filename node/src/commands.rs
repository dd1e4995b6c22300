//! Read-only operational commands (§6 CLI surface): `balance`, `status`,
//! `validators`. None of these talk to a running node over a wire protocol
//! — the HTTP/JSON API is explicitly out of scope (spec.md §1) — they open
//! the same on-disk `dataDir` a running node writes to, exactly as §4.10
//! describes.

use ember_chain::{BlockchainStore, StoreConfig};
use ember_common::config::NodeConfig;
use ember_consensus::{ValidatorManager, ValidatorManagerConfig, ValidatorState};
use ember_crypto::PublicKey;
use std::path::Path;

/// Process exit codes (§6): 0 success, 1 usage, 2 unreachable node.
pub enum ExitCode {
    Success = 0,
    Usage = 1,
    Unreachable = 2,
}

fn open_store(config: &NodeConfig) -> Result<BlockchainStore, ExitCode> {
    BlockchainStore::initialize(StoreConfig {
        data_dir: config.storage.data_dir.clone(),
        block_size_limit: config.storage.block_size_limit_bytes as usize,
        reward_schedule: ember_chain::RewardSchedule::new(
            config.storage.initial_reward,
            config.storage.halving_interval_blocks,
            config.storage.max_supply,
        ),
        checkpoint_interval: config.storage.checkpoint_interval,
        checkpoints_to_keep: config.storage.checkpoints_to_keep,
    })
    .map_err(|err| {
        eprintln!("cannot open chain store at {}: {err}", config.storage.data_dir.display());
        ExitCode::Unreachable
    })
}

pub fn balance(config: &NodeConfig, address: &str) -> ExitCode {
    let address = match PublicKey::from_hex(address) {
        Ok(address) => address,
        Err(err) => {
            eprintln!("invalid address: {err}");
            return ExitCode::Usage;
        }
    };
    let store = match open_store(config) {
        Ok(store) => store,
        Err(code) => return code,
    };
    match store.get_account(&address) {
        Some(account) => {
            println!("address:  {}", account.address.to_hex());
            println!("balance:  {}", account.balance);
            println!("nonce:    {}", account.nonce);
            println!("stake:    {}", account.stake);
        }
        None => {
            println!("address:  {}", address.to_hex());
            println!("balance:  0 (no committed account)");
        }
    }
    ExitCode::Success
}

pub fn status(config: &NodeConfig) -> ExitCode {
    let store = match open_store(config) {
        Ok(store) => store,
        Err(code) => return code,
    };
    match store.get_height() {
        Some(height) => println!("height:         {height}"),
        None => println!("height:         (genesis, no blocks committed)"),
    }
    println!("tip hash:       {}", store.tip_hash());
    println!("issued supply:  {}", store.issued_supply());
    ExitCode::Success
}

pub fn validators(config: &NodeConfig) -> ExitCode {
    let path: &Path = &config.storage.data_dir.join("validators.dat");
    let manager = match ValidatorManager::load_snapshot(
        ValidatorManagerConfig {
            consensus: config.consensus.clone(),
            min_stake: config.consensus.min_validator_stake,
            distribution_deadline_height: 0,
            developer_reward: config.distribution.developer_reward,
            validator_reward: config.distribution.validator_reward,
        },
        path,
    ) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("cannot read validator snapshot at {}: {err}", path.display());
            return ExitCode::Unreachable;
        }
    };
    let all = manager.all_validators();
    if all.is_empty() {
        println!("(no known validators)");
        return ExitCode::Success;
    }
    for validator in all {
        let state = match validator.state {
            ValidatorState::Active => "active",
            ValidatorState::Inactive => "inactive",
            ValidatorState::Jailed => "jailed",
            ValidatorState::Tombstoned => "tombstoned",
        };
        println!(
            "{}  stake={:<10} state={:<10} moniker={}",
            validator.address.to_hex(),
            validator.stake,
            state,
            validator.moniker,
        );
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn status_on_fresh_data_dir_succeeds_at_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(matches!(status(&config), ExitCode::Success));
    }

    #[test]
    fn balance_rejects_malformed_address() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(matches!(balance(&config, "not-hex"), ExitCode::Usage));
    }

    #[test]
    fn validators_on_fresh_data_dir_reports_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(matches!(validators(&config), ExitCode::Success));
    }
}
