use ember_crypto::sig::PublicKey;
use thiserror::Error;

/// §7 Consensus error kinds.
#[derive(Debug, Error, PartialEq)]
pub enum ValidatorError {
    #[error("validator {0:?} is already registered")]
    AlreadyRegistered(PublicKey),
    #[error("stake {have} is below the minimum required {need}")]
    InsufficientStake { have: u64, need: u64 },
    #[error("no validator registered at {0:?}")]
    NotFound(PublicKey),
    #[error("validator {0:?} is jailed or tombstoned and cannot activate")]
    NotEligible(PublicKey),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not selected as proposer for this round")]
    NotProposer,
    #[error("proposed block is invalid: {0}")]
    InvalidProposal(String),
    #[error("a validator double-signed at the same height/round")]
    DoubleSignDetected,
    #[error("round timed out waiting for quorum")]
    RoundTimeout,
    #[error("height stalled after exhausting all rounds")]
    HeightStalled,
    #[error("underlying store rejected the block: {0}")]
    Store(#[from] ember_chain::StoreError),
}
