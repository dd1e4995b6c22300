use crate::message::Frame;
use ember_crypto::PeerID;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerServices {
    pub is_validator: bool,
    pub full_history: bool,
}

/// A live, authenticated session (§3 Data Model: Peer / §4.1).
pub struct Peer {
    pub id: PeerID,
    pub address: SocketAddr,
    pub direction: PeerDirection,
    pub services: PeerServices,
    pub connected_at: u64,
    pub last_ping_sent_at: Option<u64>,
    pub last_seen: u64,
    outbound: mpsc::Sender<Frame>,
}

impl Peer {
    pub fn new(id: PeerID, address: SocketAddr, direction: PeerDirection, outbound: mpsc::Sender<Frame>) -> Self {
        let ts = now();
        Peer {
            id,
            address,
            direction,
            services: PeerServices::default(),
            connected_at: ts,
            last_ping_sent_at: None,
            last_seen: ts,
            outbound,
        }
    }

    pub async fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).await.is_ok()
    }

    pub fn touch(&mut self) {
        self.last_seen = now();
    }

    pub fn is_validator(&self) -> bool {
        self.services.is_validator
    }
}
