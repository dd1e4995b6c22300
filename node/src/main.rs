//! Entry point for the `ember-node` binary. Parses the CLI (§4.10), loads
//! configuration, and either runs the node or serves one of the read-only
//! operational commands (§6). Kept thin: everything else lives in `lib.rs`
//! and its submodules, matching the teacher's `main.rs`/application-library
//! split.

use clap::Parser;
use ember_common::config::NodeConfig;
use ember_common::logging;
use ember_node::cli::{Cli, Command};
use ember_node::commands::{self, ExitCode};
use ember_node::identity::NodeIdentity;
use ember_shutdown::Shutdown;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

const LOG_TARGET: &str = "ember::node::main";
const DEFAULT_DATA_DIR: &str = "./data";

fn main() {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    let exit_code = match cli.command {
        Command::Init => run_init(&data_dir, &config_path),
        Command::Run { moniker, validator_stake } => run_node(&data_dir, &config_path, moniker, validator_stake),
        Command::Balance { address } => with_config(&data_dir, &config_path, |config| commands::balance(config, &address)),
        Command::Status => with_config(&data_dir, &config_path, commands::status),
        Command::Validators => with_config(&data_dir, &config_path, commands::validators),
    };

    process::exit(exit_code as i32);
}

fn with_config(data_dir: &Path, config_path: &Path, f: impl FnOnce(&NodeConfig) -> ExitCode) -> ExitCode {
    logging::init_tracing("warn");
    match load_config(data_dir, config_path) {
        Ok(config) => f(&config),
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            ExitCode::Usage
        }
    }
}

fn load_config(data_dir: &Path, config_path: &Path) -> Result<NodeConfig, ember_common::config::ConfigError> {
    let path = config_path.exists().then_some(config_path);
    let mut config = NodeConfig::load(path)?;
    config.storage.data_dir = data_dir.to_path_buf();
    Ok(config)
}

fn run_init(data_dir: &Path, config_path: &Path) -> ExitCode {
    logging::init_tracing("info");
    if let Err(err) = std::fs::create_dir_all(data_dir) {
        error!(target: LOG_TARGET, %err, "failed to create data directory");
        return ExitCode::Usage;
    }
    if !config_path.exists() {
        if let Err(err) = NodeConfig::write_default(config_path) {
            error!(target: LOG_TARGET, %err, "failed to write default configuration");
            return ExitCode::Usage;
        }
    }
    let identity_path = data_dir.join("identity.toml");
    match NodeIdentity::load_or_create(&identity_path, "ember-node") {
        Ok(identity) => {
            info!(target: LOG_TARGET, address = %identity.address(), "node identity ready");
            ExitCode::Success
        }
        Err(err) => {
            error!(target: LOG_TARGET, %err, "failed to create node identity");
            ExitCode::Usage
        }
    }
}

fn run_node(data_dir: &Path, config_path: &Path, moniker: Option<String>, validator_stake: Option<u64>) -> ExitCode {
    logging::init_tracing("info");
    let config = match load_config(data_dir, config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(target: LOG_TARGET, %err, "failed to load configuration");
            return ExitCode::Usage;
        }
    };

    let identity_path = data_dir.join("identity.toml");
    let default_moniker = moniker.clone().unwrap_or_else(|| "ember-node".to_string());
    let identity = match NodeIdentity::load_or_create(&identity_path, &default_moniker) {
        Ok(identity) => identity,
        Err(err) => {
            error!(target: LOG_TARGET, %err, "failed to load node identity");
            return ExitCode::Unreachable;
        }
    };
    let register_as_validator = validator_stake.map(|stake| (stake, identity.moniker.clone()));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(target: LOG_TARGET, %err, "failed to start async runtime");
            return ExitCode::Unreachable;
        }
    };

    runtime.block_on(async move {
        let mut shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: LOG_TARGET, "received shutdown signal");
            shutdown.trigger();
        });

        match ember_node::run(config, Some(identity), register_as_validator, signal).await {
            Ok(()) => ExitCode::Success,
            Err(err) => {
                // anyhow::Error::new gives a chained, multi-cause render of the
                // typed NodeError for the one place a human actually reads it.
                let err = anyhow::Error::new(err);
                error!(target: LOG_TARGET, err = format!("{err:#}"), "node exited with an error");
                ExitCode::Unreachable
            }
        }
    })
}
