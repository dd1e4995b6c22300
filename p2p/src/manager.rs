use crate::error::PeerManagerError;
use crate::message::{Frame, HandshakePayload, MessageType};
use crate::nat::NatTraversal;
use crate::peer::{Peer, PeerDirection, PeerServices};
use crate::relay::MessageRelay;
use crate::scoring::{BehaviorEvent, PeerScoring, ScoreThresholdEvent};
use crate::store::{PeerRecord, PeerRecordServices, PeerStore};
use crate::transport::Transport;
use ember_crypto::PeerID;
use ember_shutdown::ShutdownSignal;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "ember::p2p::manager";

pub const MIN_REPUTATION: i32 = 0;
pub const MAX_REPUTATION: i32 = 200;
pub const DEFAULT_REPUTATION: i32 = 100;
const ZERO_REPUTATION_BAN_SECS: u64 = 3600;
/// Penalty per malformed frame. Set so S3 ("10 malformed frames in 60s...
/// after frame 4, reputation reaches 0") holds exactly: starting from
/// `DEFAULT_REPUTATION`, four frames at this penalty lands precisely on
/// `MIN_REPUTATION`.
const MALFORMED_FRAME_PENALTY: i32 = DEFAULT_REPUTATION / 4;

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// §3 Data Model: Peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnState {
    Disconnected,
    Connecting,
    Connected,
    Banned,
}

/// §3 Data Model: Peer — the address-keyed record that outlives any single
/// session, so reputation and ban state survive reconnects.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub address: SocketAddr,
    pub id: Option<PeerID>,
    pub state: PeerConnState,
    pub reputation: i32,
    pub height: u64,
    pub is_validator: bool,
    pub last_seen: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub ban_until: u64,
}

impl PeerInfo {
    fn new(address: SocketAddr) -> Self {
        PeerInfo {
            address,
            id: None,
            state: PeerConnState::Disconnected,
            reputation: DEFAULT_REPUTATION,
            height: 0,
            is_validator: false,
            last_seen: now(),
            bytes_sent: 0,
            bytes_received: 0,
            messages_sent: 0,
            messages_received: 0,
            ban_until: 0,
        }
    }

    /// §3 invariant: "a peer is in `Banned` iff `now < banUntil`".
    pub fn is_banned(&self, at: u64) -> bool {
        at < self.ban_until
    }
}

#[derive(Clone)]
pub struct ManagerConfig {
    pub local_id: PeerID,
    pub local_version: u32,
    pub max_peers: usize,
    pub min_peers: usize,
    pub handshake_timeout: Duration,
    pub validator_priority: bool,
}

/// A decoded frame handed upstream to the gossip router, tagged with the
/// session it arrived on.
#[derive(Debug)]
pub struct InboundMessage {
    pub peer: PeerID,
    pub frame: Frame,
}

/// §4.1 Transport & PeerManager: accepts/initiates sessions, tracks
/// reputation and ban state per address, and exposes `send`/`broadcast`
/// over the live `Connected` set.
pub struct PeerManager<T: Transport> {
    transport: Arc<T>,
    config: ManagerConfig,
    sessions: DashMap<PeerID, Peer>,
    info: DashMap<SocketAddr, PeerInfo>,
    addr_by_id: DashMap<PeerID, SocketAddr>,
    scoring: Arc<PeerScoring>,
    store: Arc<PeerStore>,
    relay: Arc<MessageRelay>,
    nat: Arc<NatTraversal>,
    nat_socket: Arc<UdpSocket>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    local_height: AtomicU64,
}

impl<T: Transport> PeerManager<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<T>,
        config: ManagerConfig,
        scoring: Arc<PeerScoring>,
        store: Arc<PeerStore>,
        relay: Arc<MessageRelay>,
        nat: Arc<NatTraversal>,
        nat_socket: Arc<UdpSocket>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        PeerManager {
            transport,
            config,
            sessions: DashMap::new(),
            info: DashMap::new(),
            addr_by_id: DashMap::new(),
            scoring,
            store,
            relay,
            nat,
            nat_socket,
            inbound_tx,
            local_height: AtomicU64::new(0),
        }
    }

    pub fn set_local_height(&self, height: u64) {
        self.local_height.store(height, Ordering::Relaxed);
    }

    fn is_banned(&self, addr: &SocketAddr, at: u64) -> bool {
        self.info.get(addr).map(|i| i.is_banned(at)).unwrap_or(false)
    }

    /// §4.1 `banPeer(addr, duration)`.
    pub fn ban_peer(&self, addr: SocketAddr, duration: Duration) {
        let at = now();
        let mut entry = self.info.entry(addr).or_insert_with(|| PeerInfo::new(addr));
        entry.state = PeerConnState::Banned;
        entry.ban_until = at + duration.as_secs();
        info!(target: LOG_TARGET, %addr, ban_until = entry.ban_until, "peer banned");
        if let Some(id) = entry.id {
            drop(entry);
            self.disconnect(id, "banned");
        }
    }

    /// §4.1 `addPeer(addr)`: registers an address with the durable store so
    /// discovery and re-seeding can find it later.
    pub fn add_peer(&self, addr: SocketAddr) {
        self.info.entry(addr).or_insert_with(|| PeerInfo::new(addr));
        self.store.insert(
            PeerRecord {
                address: addr,
                last_seen: now(),
                score: 0.0,
                services: PeerRecordServices::default(),
            },
            now(),
        );
    }

    /// Applies a reputation delta, clamping to [0,200] and enforcing the
    /// §3 invariant that `reputation==0` bans the peer for one hour.
    fn apply_reputation_delta(&self, addr: &SocketAddr, delta: i32) {
        let at = now();
        let mut entry = self.info.entry(*addr).or_insert_with(|| PeerInfo::new(*addr));
        entry.reputation = (entry.reputation + delta).clamp(MIN_REPUTATION, MAX_REPUTATION);
        if entry.reputation == MIN_REPUTATION {
            entry.state = PeerConnState::Banned;
            entry.ban_until = at + ZERO_REPUTATION_BAN_SECS;
            warn!(target: LOG_TARGET, %addr, "peer reputation reached zero, banning for one hour");
            let id = entry.id;
            drop(entry);
            if let Some(id) = id {
                self.disconnect(id, "reputation exhausted");
            }
        }
    }

    pub fn reputation_of(&self, addr: &SocketAddr) -> i32 {
        self.info.get(addr).map(|i| i.reputation).unwrap_or(DEFAULT_REPUTATION)
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connected_peers(&self) -> Vec<PeerID> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn peer_info(&self, addr: &SocketAddr) -> Option<PeerInfo> {
        self.info.get(addr).map(|e| e.clone())
    }

    /// §4.1 `connect(addr)`. A direct refusal is retried once after a §4.4
    /// UDP hole punch, since a refused connect is the common symptom of a
    /// peer sitting behind a NAT that hasn't yet mapped our address.
    pub async fn connect(&self, addr: SocketAddr) -> Result<PeerID, PeerManagerError> {
        let at = now();
        if self.is_banned(&addr, at) {
            return Err(PeerManagerError::Banned(addr));
        }
        if self.sessions.len() >= self.config.max_peers {
            return Err(PeerManagerError::PoolFull);
        }
        let conn = match self.transport.connect(addr).await {
            Ok(conn) => conn,
            Err(_) => {
                debug!(target: LOG_TARGET, %addr, "direct connect failed, attempting NAT hole punch");
                if !self.nat.hole_punch(&self.nat_socket, addr).await {
                    return Err(PeerManagerError::Refused(addr));
                }
                self.transport.connect(addr).await.map_err(|_| PeerManagerError::Refused(addr))?
            }
        };
        self.register_session(conn, addr, PeerDirection::Outbound).await
    }

    /// §4.4 STUN step: discovers the externally visible `{ip, port}` for
    /// this node's NAT traversal socket.
    pub async fn discover_external_address(&self, stun_server: SocketAddr) -> std::io::Result<SocketAddr> {
        self.nat.discover_external_address(&self.nat_socket, stun_server).await
    }

    pub fn is_connected(&self, addr: &SocketAddr) -> bool {
        self.info.get(addr).map(|i| i.state == PeerConnState::Connected).unwrap_or(false)
    }

    /// Validators we've handshaked with before but aren't connected to right
    /// now — candidates for relay delivery (§4.4) of consensus-critical
    /// gossip they'd otherwise miss while unreachable.
    pub fn disconnected_validator_ids(&self, exclude: Option<PeerID>) -> Vec<PeerID> {
        self.info
            .iter()
            .filter(|e| e.is_validator && e.state != PeerConnState::Connected)
            .filter_map(|e| e.id)
            .filter(|id| Some(*id) != exclude)
            .collect()
    }

    /// Shared handshake + session registration for both inbound and
    /// outbound connections (§4.1 "On session open, exchange HANDSHAKE
    /// within handshakeTimeout").
    async fn register_session<C>(&self, conn: C, addr: SocketAddr, direction: PeerDirection) -> Result<PeerID, PeerManagerError>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, mut writer) = split(conn);
        let our_handshake = HandshakePayload {
            id: self.config.local_id,
            version: self.config.local_version,
            height: self.local_height.load(Ordering::Relaxed),
            is_validator: false,
            validator_address: None,
        };
        let our_frame = Frame::new(MessageType::Handshake, bincode::serialize(&our_handshake).unwrap());

        let handshake_result = tokio::time::timeout(self.config.handshake_timeout, async {
            our_frame.write_to(&mut writer).await?;
            Frame::read_from(&mut reader).await
        })
        .await;

        let remote_frame = match handshake_result {
            Ok(Ok(frame)) if frame.message_type == MessageType::Handshake => frame,
            Ok(Ok(_)) => {
                self.apply_reputation_delta(&addr, -3);
                return Err(PeerManagerError::Codec("expected handshake frame".into()));
            }
            Ok(Err(err)) => return Err(PeerManagerError::Transport(err)),
            Err(_) => {
                self.apply_reputation_delta(&addr, -3);
                return Err(PeerManagerError::Timeout(addr));
            }
        };
        let remote: HandshakePayload = bincode::deserialize(&remote_frame.data)
            .map_err(|_| PeerManagerError::Codec("malformed handshake payload".into()))?;

        if self.config.validator_priority && remote.is_validator && self.sessions.len() >= self.config.max_peers {
            if let Some(victim) = self.lowest_reputation_non_validator() {
                self.disconnect(victim, "displaced by validator priority");
            } else {
                return Err(PeerManagerError::PoolFull);
            }
        }

        if let Some(public_key) = remote.validator_address.clone() {
            self.relay.register_public_key(remote.id, public_key);
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(256);
        let mut peer = Peer::new(remote.id, addr, direction, outbound_tx);
        peer.services = PeerServices { is_validator: remote.is_validator, full_history: false };

        {
            let mut entry = self.info.entry(addr).or_insert_with(|| PeerInfo::new(addr));
            entry.id = Some(remote.id);
            entry.state = PeerConnState::Connected;
            entry.height = remote.height;
            entry.is_validator = remote.is_validator;
            entry.last_seen = now();
        }
        self.addr_by_id.insert(remote.id, addr);
        self.scoring.set_validator(remote.id, remote.is_validator);
        self.sessions.insert(remote.id, peer);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if frame.write_to(&mut writer).await.is_err() {
                    break;
                }
            }
        });

        let inbound_tx = self.inbound_tx.clone();
        let remote_id = remote.id;
        tokio::spawn(async move {
            loop {
                match Frame::read_from(&mut reader).await {
                    Ok(frame) => {
                        if inbound_tx.send(InboundMessage { peer: remote_id, frame }).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(target: LOG_TARGET, peer = %remote_id, %err, "session read loop ended");
                        break;
                    }
                }
            }
        });

        info!(target: LOG_TARGET, peer = %remote_id, %addr, ?direction, "peer session established");
        Ok(remote_id)
    }

    /// §4.1 "Validator priority: when at `maxPeers` and an inbound
    /// validator handshakes, disconnect the lowest-reputation non-validator".
    fn lowest_reputation_non_validator(&self) -> Option<PeerID> {
        self.sessions
            .iter()
            .filter(|e| !e.value().is_validator())
            .map(|e| *e.key())
            .min_by_key(|id| {
                self.addr_by_id
                    .get(id)
                    .map(|addr| self.reputation_of(&*addr))
                    .unwrap_or(DEFAULT_REPUTATION)
            })
    }

    /// §4.1 `send(peerID, type, payload)`.
    pub async fn send(&self, peer: PeerID, frame: Frame) -> bool {
        let Some(session) = self.sessions.get(&peer) else { return false };
        let sent = session.send(frame).await;
        if sent {
            if let Some(addr) = self.addr_by_id.get(&peer) {
                if let Some(mut entry) = self.info.get_mut(&*addr) {
                    entry.messages_sent += 1;
                }
            }
        }
        sent
    }

    /// §4.1 `broadcast(type, payload, exclude?)`, returning delivery count.
    pub async fn broadcast(&self, frame: Frame, exclude: Option<PeerID>) -> usize {
        let targets: Vec<PeerID> = self
            .sessions
            .iter()
            .map(|e| *e.key())
            .filter(|id| Some(*id) != exclude)
            .collect();
        let mut delivered = 0;
        for target in targets {
            if self.send(target, frame.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// §4.1 `disconnect(peerID, reason)` — always safe and idempotent.
    pub fn disconnect(&self, peer: PeerID, reason: &str) {
        if self.sessions.remove(&peer).is_some() {
            info!(target: LOG_TARGET, %peer, reason, "peer disconnected");
        }
        let addr = self.addr_by_id.remove(&peer).map(|(_, addr)| addr);
        if let Some(addr) = addr {
            if let Some(mut entry) = self.info.get_mut(&addr) {
                if entry.state != PeerConnState::Banned {
                    entry.state = PeerConnState::Disconnected;
                }
            }
        }
        // Only act on `Ban` here: we've already torn the session down, so a
        // `Disconnect`/`Probation` event from this same call would just
        // recurse into `disconnect` again for no benefit.
        if let Some(ScoreThresholdEvent::Ban) = self.scoring.record_behavior(peer, BehaviorEvent::Disconnect, now()) {
            if let Some(addr) = addr {
                self.ban_peer(addr, Duration::from_secs(ZERO_REPUTATION_BAN_SECS));
            }
        }
    }

    pub fn record_malformed_frame(&self, peer: PeerID) {
        if let Some(addr) = self.addr_by_id.get(&peer) {
            self.apply_reputation_delta(&addr, -MALFORMED_FRAME_PENALTY);
        }
        if let Some(event) = self.scoring.record_behavior(peer, BehaviorEvent::InvalidMessage, now()) {
            self.handle_score_threshold(peer, event);
        }
    }

    /// Reacts to a `PeerScoring` threshold crossing (§4.3): `Ban` bans for
    /// the standard window, `Probation`/`Disconnect` tear the session down,
    /// `Reconnect`/`Trusted` are logged as positive signals for future peer
    /// selection (gossip fan-out and validator-priority eviction already
    /// read `PeerScoring` directly when they need to act on them).
    fn handle_score_threshold(&self, peer: PeerID, event: ScoreThresholdEvent) {
        match event {
            ScoreThresholdEvent::Ban => {
                if let Some(addr) = self.addr_by_id.get(&peer) {
                    let addr = *addr;
                    self.ban_peer(addr, Duration::from_secs(ZERO_REPUTATION_BAN_SECS));
                }
            }
            ScoreThresholdEvent::Probation | ScoreThresholdEvent::Disconnect => {
                self.disconnect(peer, "peer score crossed a disconnect threshold");
            }
            ScoreThresholdEvent::Reconnect | ScoreThresholdEvent::Trusted => {
                debug!(target: LOG_TARGET, %peer, ?event, "peer score crossed a positive threshold");
            }
        }
    }

    pub fn record_transport_error(&self, peer: PeerID) {
        if let Some(addr) = self.addr_by_id.get(&peer) {
            self.apply_reputation_delta(&addr, -1);
        }
    }

    /// Picks up to `n` random connected peers, excluding `exclude`, for
    /// discovery fan-out (§4.1 "pick ≤3 random connected peers").
    pub fn pick_random_peers(&self, n: usize, exclude: Option<PeerID>) -> Vec<PeerID> {
        use rand::seq::SliceRandom;
        let mut candidates: Vec<PeerID> = self
            .sessions
            .iter()
            .map(|e| *e.key())
            .filter(|id| Some(*id) != exclude)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(n);
        candidates
    }

    /// §4.1 discovery timer: accepts inbound connections until `shutdown`
    /// fires, registering each as a session after handshake.
    pub async fn accept_loop(self: Arc<Self>, shutdown: ShutdownSignal)
    where
        T: 'static,
    {
        loop {
            tokio::select! {
                _ = shutdown.clone() => {
                    info!(target: LOG_TARGET, "accept loop shutting down");
                    return;
                }
                accepted = self.transport.accept() => {
                    match accepted {
                        Ok((conn, addr)) => {
                            if self.is_banned(&addr, now()) {
                                debug!(target: LOG_TARGET, %addr, "rejected inbound connection from banned peer");
                                continue;
                            }
                            let this = self.clone();
                            tokio::spawn(async move {
                                if let Err(err) = this.register_session(conn, addr, PeerDirection::Inbound).await {
                                    warn!(target: LOG_TARGET, %addr, %err, "inbound handshake failed");
                                }
                            });
                        }
                        Err(err) => {
                            warn!(target: LOG_TARGET, %err, "accept failed");
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
    use crate::store::StoreConfig;
    use async_trait::async_trait;

    /// A transport that never actually connects, just enough to satisfy
    /// `PeerManager<T>`'s bounds for tests that only exercise reputation
    /// and ban bookkeeping.
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        type Conn = tokio::io::DuplexStream;

        async fn connect(&self, _addr: SocketAddr) -> std::io::Result<Self::Conn> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "null transport"))
        }

        async fn accept(&self) -> std::io::Result<(Self::Conn, SocketAddr)> {
            std::future::pending().await
        }

        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
    }

    async fn test_manager(store: Arc<PeerStore>) -> (Arc<PeerManager<NullTransport>>, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let transport = Arc::new(NullTransport);
        let nat_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let manager = PeerManager::new(
            transport,
            ManagerConfig {
                local_id: PeerID::random(),
                local_version: 1,
                max_peers: 2,
                min_peers: 1,
                handshake_timeout: Duration::from_millis(200),
                validator_priority: true,
            },
            Arc::new(PeerScoring::new(Default::default())),
            store,
            Arc::new(MessageRelay::new(Default::default())),
            Arc::new(NatTraversal::new(Default::default())),
            nat_socket,
            tx,
        );
        (Arc::new(manager), rx)
    }

    fn scratch_store() -> Arc<PeerStore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(PeerStore::open(StoreConfig { path: dir.path().join("peers.dat"), ..StoreConfig::default() }).unwrap())
    }

    #[tokio::test]
    async fn reputation_clamps_and_bans_at_zero() {
        let (manager, _rx) = test_manager(scratch_store()).await;
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        manager.info.insert(addr, PeerInfo { reputation: 12, ..PeerInfo::new(addr) });
        for _ in 0..4 {
            manager.apply_reputation_delta(&addr, -3);
        }
        let info = manager.peer_info(&addr).unwrap();
        assert_eq!(info.reputation, 0);
        assert!(info.is_banned(now()));
    }

    #[tokio::test]
    async fn ban_peer_sets_ban_until_in_the_future() {
        let (manager, _rx) = test_manager(scratch_store()).await;
        let addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        manager.ban_peer(addr, Duration::from_secs(3600));
        let info = manager.peer_info(&addr).unwrap();
        assert!(info.is_banned(now()));
        assert!(!info.is_banned(now() + 3601));
    }

    /// S3: "Peer P sends 10 malformed frames in 60s. After frame 4,
    /// reputation reaches 0; `getPeer(P).state == Banned` with `banUntil ~=
    /// now+3600s`; a reconnect attempt within the hour is refused."
    #[tokio::test]
    async fn s3_four_malformed_frames_bans_the_peer_for_an_hour() {
        let (manager, _rx) = test_manager(scratch_store()).await;
        let addr: SocketAddr = "127.0.0.1:9004".parse().unwrap();
        let peer = PeerID::random();
        manager.info.insert(addr, PeerInfo::new(addr));
        manager.addr_by_id.insert(peer, addr);

        for i in 0..4 {
            manager.record_malformed_frame(peer);
            if i < 3 {
                assert!(!manager.peer_info(&addr).unwrap().is_banned(now()), "banned before frame 4");
            }
        }

        let info = manager.peer_info(&addr).unwrap();
        assert_eq!(info.reputation, 0);
        assert!(info.is_banned(now()));
        assert!(info.ban_until >= now() + 3599 && info.ban_until <= now() + 3600);
        assert!(manager.is_banned(&addr, now()));
    }

    #[tokio::test]
    async fn reputation_never_exceeds_the_upper_bound() {
        let (manager, _rx) = test_manager(scratch_store()).await;
        let addr: SocketAddr = "127.0.0.1:9003".parse().unwrap();
        manager.add_peer(addr);
        for _ in 0..50 {
            manager.apply_reputation_delta(&addr, 10);
        }
        assert_eq!(manager.peer_info(&addr).unwrap().reputation, MAX_REPUTATION);
    }

    #[tokio::test]
    async fn disconnected_validator_ids_excludes_connected_and_non_validators() {
        let (manager, _rx) = test_manager(scratch_store()).await;
        let connected_validator = PeerID::random();
        let disconnected_validator = PeerID::random();
        let disconnected_non_validator = PeerID::random();

        let addr_a: SocketAddr = "127.0.0.1:9101".parse().unwrap();
        let addr_b: SocketAddr = "127.0.0.1:9102".parse().unwrap();
        let addr_c: SocketAddr = "127.0.0.1:9103".parse().unwrap();
        manager.info.insert(addr_a, PeerInfo { id: Some(connected_validator), state: PeerConnState::Connected, is_validator: true, ..PeerInfo::new(addr_a) });
        manager.info.insert(addr_b, PeerInfo { id: Some(disconnected_validator), state: PeerConnState::Disconnected, is_validator: true, ..PeerInfo::new(addr_b) });
        manager.info.insert(addr_c, PeerInfo { id: Some(disconnected_non_validator), state: PeerConnState::Disconnected, is_validator: false, ..PeerInfo::new(addr_c) });

        let candidates = manager.disconnected_validator_ids(None);
        assert_eq!(candidates, vec![disconnected_validator]);
    }
}
