//! Operational CLI surface (§6, §4.10): `run` starts the node; `balance`,
//! `status` and `validators` are read-only commands run against a local
//! `dataDir` with no RPC layer, exactly as §4.10 specifies.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ember-node", author, version, about = "Ember reputation-weighted proof-of-stake node", long_about = None)]
pub struct Cli {
    /// Node data directory (blocks, index, checkpoints, peer store, identity).
    #[arg(long, global = true, env = "EMBER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Configuration file; defaults to `<dataDir>/config.toml`.
    #[arg(long, global = true, env = "EMBER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file and generate a node identity if
    /// none exist yet, then exit.
    Init,
    /// Start the node: transport, gossip, mempool, consensus and the chain
    /// store, until interrupted.
    Run {
        /// Moniker to register under if this run also registers a validator.
        #[arg(long)]
        moniker: Option<String>,
        /// Run as a validator with the given stake, registering and
        /// activating on startup if not already known.
        #[arg(long)]
        validator_stake: Option<u64>,
    },
    /// Print an account's committed balance, nonce and stake.
    Balance {
        /// Hex-encoded public key.
        address: String,
    },
    /// Print chain height, tip hash and issued supply.
    Status,
    /// List known validators and their state.
    Validators,
}
