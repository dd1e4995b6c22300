use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const LOG_TARGET: &str = "ember::p2p::nat";

const HOLE_PUNCH_INTERVAL: Duration = Duration::from_millis(500);
const HOLE_PUNCH_PAYLOAD: &[u8] = b"HOLE_PUNCH";

/// Minimal STUN binding request/response pair, just enough to discover our
/// externally visible `{ip, port}` via XOR-MAPPED-ADDRESS (§4.4). The magic
/// cookie and XOR mask follow RFC 5389.
const STUN_MAGIC_COOKIE: u32 = 0x2112_A442;
const STUN_BINDING_REQUEST: u16 = 0x0001;
const STUN_BINDING_RESPONSE: u16 = 0x0101;
const STUN_ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

fn build_binding_request(transaction_id: [u8; 12]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(20);
    msg.extend_from_slice(&STUN_BINDING_REQUEST.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes()); // length, no attributes
    msg.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(&transaction_id);
    msg
}

fn parse_xor_mapped_address(resp: &[u8]) -> Option<SocketAddr> {
    if resp.len() < 20 {
        return None;
    }
    let msg_type = u16::from_be_bytes([resp[0], resp[1]]);
    if msg_type != STUN_BINDING_RESPONSE {
        return None;
    }
    let mut offset = 20;
    while offset + 4 <= resp.len() {
        let attr_type = u16::from_be_bytes([resp[offset], resp[offset + 1]]);
        let attr_len = u16::from_be_bytes([resp[offset + 2], resp[offset + 3]]) as usize;
        let value_start = offset + 4;
        if value_start + attr_len > resp.len() {
            return None;
        }
        if attr_type == STUN_ATTR_XOR_MAPPED_ADDRESS && attr_len >= 8 {
            let value = &resp[value_start..value_start + attr_len];
            let port = u16::from_be_bytes([value[2], value[3]]) ^ ((STUN_MAGIC_COOKIE >> 16) as u16);
            let cookie_bytes = STUN_MAGIC_COOKIE.to_be_bytes();
            let ip = [
                value[4] ^ cookie_bytes[0],
                value[5] ^ cookie_bytes[1],
                value[6] ^ cookie_bytes[2],
                value[7] ^ cookie_bytes[3],
            ];
            return Some(SocketAddr::from((ip, port)));
        }
        offset = value_start + attr_len;
    }
    None
}

pub struct NatConfig {
    pub punch_timeout: Duration,
}

impl Default for NatConfig {
    fn default() -> Self {
        NatConfig {
            punch_timeout: Duration::from_secs(10),
        }
    }
}

/// §4.4 NATTraversal: STUN-style external address discovery and UDP
/// hole-punching, with optional escalation to relay on timeout.
pub struct NatTraversal {
    config: NatConfig,
}

impl NatTraversal {
    pub fn new(config: NatConfig) -> Self {
        NatTraversal { config }
    }

    pub async fn discover_external_address(&self, socket: &UdpSocket, stun_server: SocketAddr) -> std::io::Result<SocketAddr> {
        let transaction_id = rand::random::<[u8; 12]>();
        let request = build_binding_request(transaction_id);
        socket.send_to(&request, stun_server).await?;

        let mut buf = [0u8; 512];
        let (n, _) = tokio::time::timeout(Duration::from_secs(3), socket.recv_from(&mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "stun binding request timed out"))??;
        parse_xor_mapped_address(&buf[..n])
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed stun response"))
    }

    /// Sends `HOLE_PUNCH` every 500ms until `peer` answers or
    /// `punchTimeout` elapses, returning whether the peer was reached.
    pub async fn hole_punch(&self, socket: &UdpSocket, peer: SocketAddr) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.punch_timeout;
        let mut interval = tokio::time::interval(HOLE_PUNCH_INTERVAL);
        let mut buf = [0u8; 64];
        loop {
            if tokio::time::Instant::now() >= deadline {
                warn!(target: LOG_TARGET, %peer, "hole punch timed out");
                return false;
            }
            if let Err(err) = socket.send_to(HOLE_PUNCH_PAYLOAD, peer).await {
                warn!(target: LOG_TARGET, %peer, %err, "hole punch send failed");
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::select! {
                _ = interval.tick() => continue,
                result = tokio::time::timeout(remaining, socket.recv_from(&mut buf)) => {
                    if let Ok(Ok((n, from))) = result {
                        if from == peer && &buf[..n] == HOLE_PUNCH_PAYLOAD {
                            debug!(target: LOG_TARGET, %peer, "hole punch succeeded");
                            return true;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_request_carries_the_magic_cookie() {
        let req = build_binding_request([1; 12]);
        assert_eq!(&req[4..8], &STUN_MAGIC_COOKIE.to_be_bytes());
    }

    #[test]
    fn xor_mapped_address_round_trips() {
        let port = 7654u16;
        let ip = [203, 0, 113, 42];
        let xport = port ^ ((STUN_MAGIC_COOKIE >> 16) as u16);
        let cookie_bytes = STUN_MAGIC_COOKIE.to_be_bytes();
        let xip = [
            ip[0] ^ cookie_bytes[0],
            ip[1] ^ cookie_bytes[1],
            ip[2] ^ cookie_bytes[2],
            ip[3] ^ cookie_bytes[3],
        ];
        let mut resp = Vec::new();
        resp.extend_from_slice(&STUN_BINDING_RESPONSE.to_be_bytes());
        resp.extend_from_slice(&12u16.to_be_bytes());
        resp.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
        resp.extend_from_slice(&[0u8; 12]);
        resp.extend_from_slice(&STUN_ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
        resp.extend_from_slice(&8u16.to_be_bytes());
        resp.extend_from_slice(&[0, 1]);
        resp.extend_from_slice(&xport.to_be_bytes());
        resp.extend_from_slice(&xip);

        let addr = parse_xor_mapped_address(&resp).unwrap();
        assert_eq!(addr, SocketAddr::from((ip, port)));
    }
}
