use ember_crypto::PeerID;
use std::net::SocketAddr;
use thiserror::Error;

/// §7 P2P error kinds.
#[derive(Debug, Error)]
pub enum PeerManagerError {
    #[error("peer {0} is banned")]
    Banned(SocketAddr),
    #[error("handshake with {0} timed out")]
    Timeout(SocketAddr),
    #[error("connection to {0} refused")]
    Refused(SocketAddr),
    #[error("peer pool is full")]
    PoolFull,
    #[error("no session for peer {0:?}")]
    UnknownPeer(PeerID),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("frame decode error: {0}")]
    Codec(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay node is over its rate limit")]
    Overloaded,
    #[error("message ttl expired")]
    TtlExpired,
    #[error("duplicate message id")]
    Duplicate,
    #[error("payload exceeds maximum relay size")]
    PayloadTooLarge,
}
