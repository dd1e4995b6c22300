use std::path::PathBuf;
use thiserror::Error;

/// §7 Storage error kinds.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block height {got} does not follow current height {expected}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("previous hash mismatch: block declares {declared}, chain tip is {tip}")]
    PrevHashMismatch { declared: String, tip: String },
    #[error("block or transaction signature failed verification")]
    SignatureInvalid,
    #[error("block at height {0} is already committed")]
    DuplicateBlock(u64),
    #[error("block exceeds size limit: {actual} > {limit} bytes")]
    BlockTooLarge { actual: usize, limit: usize },
    #[error("transaction nonce {got} is not lastCommittedNonce+1 ({expected}) for sender")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("sender balance {have} is insufficient to cover {need} once prior transactions in the same block are accounted for")]
    InsufficientBalance { have: u64, need: u64 },
    #[error("balance-conservation invariant violated applying a block already accepted by validate_transactions: {0}")]
    Account(#[from] crate::types::AccountError),
    #[error("on-disk log is corrupted and requires checkpoint rewind: {0}")]
    CorruptedLog(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("no block at height {0}")]
    NotFound(u64),
}
