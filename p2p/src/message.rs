use ember_crypto::PeerID;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// §4.1 wire message types. `Prevote`/`Precommit` are not named in §4.1's
/// enumerated list but are required by §4.8's voting phases; the list there
/// covers application gossip, not the consensus round messages, so these
/// two are carried the same way `HolePunch` carries §4.4's NAT traffic.
/// `RelayEnvelope` is likewise a §4.4 addition: a `MessageRelay`-carried
/// frame addressed to a peer the sender couldn't reach directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Handshake,
    Ping,
    Pong,
    GetPeers,
    Peers,
    GetBlocks,
    Blocks,
    NewBlock,
    GetTransactions,
    Transactions,
    NewTransaction,
    ValidatorUpdate,
    Version,
    Verack,
    Addr,
    GetAddr,
    HolePunch,
    Prevote,
    Precommit,
    RelayEnvelope,
}

/// §6 "Peer handshake payload: `{id, version, height, isValidator,
/// validatorAddress}`".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub id: PeerID,
    pub version: u32,
    pub height: u64,
    pub is_validator: bool,
    pub validator_address: Option<Vec<u8>>,
}

/// §6 "`PEERS` payload: list of `ip:port` strings".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeerAddrList {
    pub addresses: Vec<String>,
}

/// The `{type, data, timestamp}` frame every session exchanges, length-
/// prefixed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub message_type: MessageType,
    pub data: Vec<u8>,
    pub timestamp: u64,
}

pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

impl Frame {
    pub fn new(message_type: MessageType, data: Vec<u8>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Frame {
            message_type,
            data,
            timestamp,
        }
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        let body = bincode::serialize(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if body.len() as u64 > MAX_FRAME_LEN as u64 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large"));
        }
        writer.write_u32(body.len() as u32).await?;
        writer.write_all(&body).await?;
        writer.flush().await
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Frame> {
        let len = reader.read_u32().await?;
        if len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame exceeds maximum length"));
        }
        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body).await?;
        bincode::deserialize(&body).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trips_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let frame = Frame::new(MessageType::Ping, b"hello".to_vec());
        frame.write_to(&mut client).await.unwrap();
        let decoded = Frame::read_from(&mut server).await.unwrap();
        assert_eq!(decoded.message_type, MessageType::Ping);
        assert_eq!(decoded.data, b"hello");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_u32(MAX_FRAME_LEN + 1).await.unwrap();
        let err = Frame::read_from(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
