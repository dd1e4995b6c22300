//! The P2P substrate (§4.1-4.4): transport and peer lifecycle, persistent
//! peer storage and seed discovery, reputation scoring, NAT traversal and
//! message relay, plus the gossip router that dedups flooded messages.
//! Owns all peer session and reputation state; every other subsystem reads
//! it only through the types re-exported here.

pub mod discovery;
pub mod error;
pub mod gossip;
pub mod manager;
pub mod message;
pub mod nat;
pub mod peer;
pub mod relay;
pub mod scoring;
pub mod store;
pub mod transport;

pub use discovery::{DiscoveryConfig, SeedDiscovery};
pub use error::{PeerManagerError, RelayError};
pub use gossip::{GossipMessage, GossipRouter};
pub use manager::{InboundMessage, ManagerConfig, PeerConnState, PeerInfo, PeerManager};
pub use message::{Frame, HandshakePayload, MessageType, PeerAddrList};
pub use nat::{NatConfig, NatTraversal};
pub use peer::{Peer, PeerDirection, PeerServices};
pub use relay::{MessageRelay, RelayConfig, RelayedMessage};
pub use scoring::{BehaviorEvent, PeerScoring, ScoreThresholdEvent, ScoringConfig};
pub use store::{PeerRecord, PeerRecordServices, PeerStore, StoreConfig};
pub use transport::{Connection, TcpTransport, Transport};
