use thiserror::Error;

/// Every subsystem error the integrator can observe while translating
/// between the wire and the subsystems it mediates.
#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error(transparent)]
    Chain(#[from] ember_chain::StoreError),
    #[error(transparent)]
    Mempool(#[from] ember_mempool::MempoolError),
    #[error(transparent)]
    Peer(#[from] ember_p2p::PeerManagerError),
    #[error(transparent)]
    Validator(#[from] ember_consensus::ValidatorError),
    #[error("malformed wire payload on {frame}: {reason}")]
    Codec { frame: &'static str, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
