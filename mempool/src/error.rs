use thiserror::Error;

/// §7 Mempool error kinds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool")]
    Duplicate,
    #[error("nonce {got} is not the expected next nonce {expected}")]
    NonceTooLow { expected: u64, got: u64 },
    #[error("fee {fee} is below the minimum required {min_fee}")]
    InsufficientFee { fee: u64, min_fee: u64 },
    #[error("transaction expired")]
    Expired,
    #[error("pool is full")]
    PoolFull,
    #[error("invalid signature")]
    InvalidSignature,
}
