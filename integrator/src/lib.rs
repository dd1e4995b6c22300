//! Wires the peer, mempool, chain and consensus subsystems into one running
//! node: translates wire frames into subsystem calls and back, and owns the
//! handful of adapter types the workspace's per-crate traits need to bridge
//! across crate boundaries.

pub mod adapters;
pub mod error;
pub mod integrator;
pub mod wire;

pub use adapters::{ChainStoreSink, MempoolBlockSource};
pub use error::IntegratorError;
pub use integrator::{Integrator, IntegratorConfig};
pub use wire::{BlockRangeRequest, TransactionsRequest, TransactionsResponse, ValidatorUpdateWire};
