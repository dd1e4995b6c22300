use crate::adapters::{ChainStoreSink, MempoolBlockSource};
use crate::error::IntegratorError;
use crate::wire::{BlockRangeRequest, RelayEnvelopeWire, TransactionsRequest, TransactionsResponse, ValidatorUpdateWire};
use ember_chain::{Block, BlockchainStore, Transaction};
use ember_common::config::{ConsensusConfig, DistributionConfig, MempoolConfig, NetworkConfig};
use ember_consensus::{
    ConsensusEngine, ConsensusInput, ConsensusOutput, ValidatorIdentity, ValidatorManager, ValidatorManagerConfig,
    VoteMessage,
};
use ember_crypto::sig::PublicKey;
use ember_crypto::PeerID;
use ember_mempool::{Mempool, MempoolPersistence, PoolConfig};
use ember_p2p::{
    DiscoveryConfig, Frame, GossipRouter, InboundMessage, ManagerConfig, MessageType, NatConfig, NatTraversal,
    PeerAddrList, PeerManager, PeerScoring, PeerStore, RelayConfig, RelayedMessage, ScoringConfig, SeedDiscovery,
    MessageRelay, StoreConfig as PeerStoreConfig, TcpTransport,
};
use ember_shutdown::ShutdownSignal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "ember::integrator";

type Consensus = ConsensusEngine<ChainStoreSink, MempoolBlockSource<ChainStoreSink>>;
type NodeMempool = Mempool<ChainStoreSink>;

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Everything the integrator needs beyond the already-constructed transport
/// and chain store, collected from `NodeConfig`'s sub-tables.
pub struct IntegratorConfig {
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub mempool: MempoolConfig,
    pub distribution: DistributionConfig,
    pub data_dir: PathBuf,
    pub local_id: PeerID,
    pub local_version: u32,
    pub min_validator_stake: u64,
    /// `StorageConfig::block_size_limit_bytes`, threaded into the consensus
    /// engine so a proposer builds within the same limit the chain store
    /// enforces on `addBlock`.
    pub block_size_limit: u64,
    /// Height at which the distribution-period bonus window closes.
    pub distribution_deadline_height: u64,
}

/// The single cross-subsystem edge. Owns no state of its own beyond wiring;
/// every field here is itself the sole owner of one subsystem's state,
/// matching the rest of the workspace's ownership model.
pub struct Integrator {
    local_id: PeerID,
    peers: Arc<PeerManager<TcpTransport>>,
    gossip: Arc<GossipRouter>,
    scoring: Arc<PeerScoring>,
    peer_store: Arc<PeerStore>,
    relay: Arc<MessageRelay>,
    discovery: Arc<SeedDiscovery>,
    mempool: Arc<NodeMempool>,
    chain: Arc<BlockchainStore>,
    validators: Arc<ValidatorManager>,
    consensus: Arc<Consensus>,
    network: NetworkConfig,
    mempool_cfg: MempoolConfig,
    validators_path: PathBuf,
    /// STUN server for the one-shot external-address discovery in [`run`](Self::run).
    stun_server: Option<SocketAddr>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl Integrator {
    pub fn new(
        config: IntegratorConfig,
        transport: Arc<TcpTransport>,
        chain: Arc<BlockchainStore>,
        identity: Option<ValidatorIdentity>,
    ) -> Result<Arc<Self>, IntegratorError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);

        let scoring = Arc::new(PeerScoring::new(ScoringConfig::default()));
        let peer_store = Arc::new(PeerStore::open(PeerStoreConfig {
            path: config.data_dir.join("peers.dat"),
            max_peers: config.network.max_peers.saturating_mul(4).max(64),
            peer_expiry_days: 30,
        })?);

        let manager_config = ManagerConfig {
            local_id: config.local_id,
            local_version: config.local_version,
            max_peers: config.network.max_peers,
            min_peers: config.network.min_peers,
            handshake_timeout: Duration::from_secs(config.network.handshake_timeout_secs),
            validator_priority: config.network.validator_priority,
        };

        let gossip = Arc::new(GossipRouter::new());
        let relay = Arc::new(MessageRelay::new(RelayConfig {
            max_relayed_per_minute: config.network.max_relayed_messages_per_min,
            message_expiry_secs: config.network.relay_message_expiry_secs,
            cleanup_interval_secs: config.network.relay_cleanup_interval_secs,
        }));
        let nat = Arc::new(NatTraversal::new(NatConfig {
            punch_timeout: Duration::from_millis(config.network.punch_timeout_ms),
        }));
        // Bound synchronously (not `.await`ed) since `new` isn't async; the
        // surrounding tokio runtime context is all `UdpSocket::from_std`
        // needs to register the socket with the reactor. The NAT socket's
        // port is independent of the TCP listen port — an ephemeral local
        // port is all STUN/hole-punching need.
        let udp_addr = SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0);
        let std_udp = std::net::UdpSocket::bind(udp_addr).map_err(IntegratorError::Io)?;
        std_udp.set_nonblocking(true).map_err(IntegratorError::Io)?;
        let nat_socket = Arc::new(UdpSocket::from_std(std_udp).map_err(IntegratorError::Io)?);
        let stun_server = config.network.stun_server.as_ref().and_then(|s| s.parse().ok());

        let peers = Arc::new(PeerManager::new(
            transport,
            manager_config,
            scoring.clone(),
            peer_store.clone(),
            relay.clone(),
            nat.clone(),
            nat_socket.clone(),
            inbound_tx,
        ));

        let mut hardcoded_seeds = Vec::new();
        let mut dns_seeds = Vec::new();
        for seed in &config.network.seed_nodes {
            match seed.parse() {
                Ok(addr) => hardcoded_seeds.push(addr),
                Err(_) => dns_seeds.push(seed.clone()),
            }
        }
        let discovery = Arc::new(SeedDiscovery::new(DiscoveryConfig {
            hardcoded_seeds,
            dns_seeds,
            default_port: config.network.port,
            probe_timeout: Duration::from_secs(3),
        }));

        let persistence = match &config.mempool.redis_url {
            Some(url) => MempoolPersistence::connect(url),
            None => MempoolPersistence::disabled(),
        };
        let pool_config = PoolConfig {
            max_transactions: config.mempool.max_transactions,
            max_size_bytes: config.mempool.max_size_bytes,
            expiration_time_secs: config.mempool.expiration_time_secs,
            min_fee: 0,
        };
        let mempool = Arc::new(Mempool::new(pool_config, ChainStoreSink(chain.clone()), persistence));

        let validators_path = config.data_dir.join("validators.dat");
        let validators = Arc::new(
            ValidatorManager::load_snapshot(
                ValidatorManagerConfig {
                    consensus: config.consensus.clone(),
                    min_stake: config.min_validator_stake,
                    distribution_deadline_height: config.distribution_deadline_height,
                    developer_reward: config.distribution.developer_reward,
                    validator_reward: config.distribution.validator_reward,
                },
                &validators_path,
            )
            .map_err(IntegratorError::Io)?,
        );

        let chain_sink = Arc::new(ChainStoreSink(chain.clone()));
        let block_source = Arc::new(MempoolBlockSource(mempool.clone()));
        let consensus = Arc::new(ConsensusEngine::new(
            config.consensus.clone(),
            config.block_size_limit,
            validators.clone(),
            chain_sink,
            block_source,
            identity,
        ));

        Ok(Arc::new(Integrator {
            local_id: config.local_id,
            peers,
            gossip,
            scoring,
            peer_store,
            relay,
            discovery,
            mempool,
            chain,
            validators,
            consensus,
            network: config.network,
            mempool_cfg: config.mempool,
            validators_path,
            stun_server,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }))
    }

    pub fn chain(&self) -> &Arc<BlockchainStore> {
        &self.chain
    }

    pub fn validators(&self) -> &Arc<ValidatorManager> {
        &self.validators
    }

    pub fn mempool(&self) -> &Arc<NodeMempool> {
        &self.mempool
    }

    pub fn peers(&self) -> &Arc<PeerManager<TcpTransport>> {
        &self.peers
    }

    /// Replays the mempool's durable snapshot; called once before [`run`].
    pub async fn restore(&self) {
        self.mempool.restore(now_unix()).await;
    }

    /// Submits a transaction originating locally (e.g. from the CLI), then
    /// gossips it the same way a peer-submitted one would be.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<(), IntegratorError> {
        self.mempool.submit(tx.clone(), now_unix()).await?;
        let frame = Frame::new(MessageType::NewTransaction, bincode::serialize(&tx).expect("Transaction always serializes"));
        self.gossip.should_deliver(GossipRouter::dedup_key(&frame));
        self.peers.broadcast(frame, None).await;
        Ok(())
    }

    pub async fn register_validator(&self, address: PublicKey, stake: u64, moniker: String) -> Result<(), IntegratorError> {
        self.validators.register(address, stake, moniker.clone())?;
        self.broadcast_validator_update(ValidatorUpdateWire::Registered { address, stake, moniker }).await;
        Ok(())
    }

    pub async fn activate_validator(&self, address: PublicKey) -> Result<(), IntegratorError> {
        self.validators.activate(&address)?;
        self.broadcast_validator_update(ValidatorUpdateWire::Activated { address }).await;
        Ok(())
    }

    async fn broadcast_validator_update(&self, update: ValidatorUpdateWire) {
        let payload = bincode::serialize(&update).expect("ValidatorUpdateWire always serializes");
        let frame = Frame::new(MessageType::ValidatorUpdate, payload);
        self.gossip.should_deliver(GossipRouter::dedup_key(&frame));
        self.peers.broadcast(frame.clone(), None).await;
        self.relay_to_disconnected_validators(&frame, None).await;
    }

    /// Drives every subsystem task until `shutdown` resolves. May only be
    /// called once per instance (the inbound channel is consumed).
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let inbound_rx = self
            .inbound_rx
            .lock()
            .await
            .take()
            .expect("Integrator::run must only be called once");

        self.peers.set_local_height(self.chain.get_height().map(|h| h + 1).unwrap_or(0));

        let (consensus_in_tx, consensus_in_rx) = mpsc::channel(256);
        let (consensus_out_tx, consensus_out_rx) = mpsc::channel(256);

        let mut handles = Vec::new();

        handles.push(tokio::spawn(self.peers.clone().accept_loop(shutdown.clone())));

        {
            let this = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                this.dispatch_inbound(inbound_rx, consensus_in_tx, shutdown).await
            }));
        }

        {
            let this = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { this.dispatch_outbound(consensus_out_rx, shutdown).await }));
        }

        {
            let consensus = self.consensus.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                consensus.run(consensus_in_rx, consensus_out_tx, shutdown).await
            }));
        }

        {
            let this = self.clone();
            handles.push(tokio::spawn(async move { this.maintenance_loop(shutdown).await }));
        }

        if let Some(stun_server) = self.stun_server {
            let peers = self.peers.clone();
            tokio::spawn(async move {
                match peers.discover_external_address(stun_server).await {
                    Ok(addr) => info!(target: LOG_TARGET, external_addr = %addr, "discovered external address via STUN"),
                    Err(err) => debug!(target: LOG_TARGET, %err, "stun external address discovery failed"),
                }
            });
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!(target: LOG_TARGET, "integrator shut down cleanly");
    }

    async fn dispatch_inbound(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        consensus_in: mpsc::Sender<ConsensusInput>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: LOG_TARGET, "inbound dispatch shutting down");
                    return;
                }
                maybe_msg = inbound.recv() => {
                    let Some(msg) = maybe_msg else { return };
                    self.handle_inbound(msg, &consensus_in).await;
                }
            }
        }
    }

    async fn handle_inbound(&self, msg: InboundMessage, consensus_in: &mpsc::Sender<ConsensusInput>) {
        let InboundMessage { peer, frame } = msg;
        self.flush_relayed_messages(peer).await;
        match frame.message_type {
            MessageType::Ping => {
                self.peers.send(peer, Frame::new(MessageType::Pong, Vec::new())).await;
            }
            MessageType::GetPeers => {
                let now = now_unix();
                let addresses = self
                    .peer_store
                    .good_peers(now, self.peer_store.expiry_days())
                    .into_iter()
                    .map(|r| r.address.to_string())
                    .collect();
                let payload = bincode::serialize(&PeerAddrList { addresses }).unwrap_or_default();
                self.peers.send(peer, Frame::new(MessageType::Peers, payload)).await;
            }
            MessageType::Peers => {
                let Ok(list) = bincode::deserialize::<PeerAddrList>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                for addr in list.addresses {
                    if let Ok(addr) = addr.parse() {
                        self.peers.add_peer(addr);
                    }
                }
            }
            MessageType::GetBlocks => {
                let Ok(req) = bincode::deserialize::<BlockRangeRequest>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                let mut blocks = Vec::new();
                for height in req.from_height..=req.to_height {
                    match self.chain.get_block_by_height(height) {
                        Ok(block) => blocks.push(block),
                        Err(_) => break,
                    }
                }
                let payload = bincode::serialize(&blocks).unwrap_or_default();
                self.peers.send(peer, Frame::new(MessageType::Blocks, payload)).await;
            }
            MessageType::Blocks => {
                let Ok(blocks) = bincode::deserialize::<Vec<Block>>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                for block in blocks {
                    let proposer = block.proposer;
                    if let Err(err) = self.chain.add_block(block, &proposer).await {
                        debug!(target: LOG_TARGET, %err, "rejected block received during sync");
                        break;
                    }
                }
                self.peers.set_local_height(self.chain.get_height().map(|h| h + 1).unwrap_or(0));
            }
            MessageType::GetTransactions => {
                let Ok(req) = bincode::deserialize::<TransactionsRequest>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                let transactions = req.hashes.iter().filter_map(|h| self.mempool.pool().get(h)).collect();
                let payload = bincode::serialize(&TransactionsResponse { transactions }).unwrap_or_default();
                self.peers.send(peer, Frame::new(MessageType::Transactions, payload)).await;
            }
            MessageType::Transactions => {
                let Ok(resp) = bincode::deserialize::<TransactionsResponse>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                for tx in resp.transactions {
                    let _ = self.mempool.submit(tx, now_unix()).await;
                }
            }
            MessageType::NewTransaction => {
                if !self.gossip.should_deliver(GossipRouter::dedup_key(&frame)) {
                    return;
                }
                let Ok(tx) = bincode::deserialize::<Transaction>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                match self.mempool.submit(tx, now_unix()).await {
                    Ok(()) => {
                        self.scoring.record_tx_outcome(peer, true);
                        self.peers.broadcast(frame, Some(peer)).await;
                    }
                    Err(err) => {
                        debug!(target: LOG_TARGET, %err, "rejected gossiped transaction");
                        self.scoring.record_tx_outcome(peer, false);
                    }
                }
            }
            MessageType::NewBlock => {
                if !self.gossip.should_deliver(GossipRouter::dedup_key(&frame)) {
                    return;
                }
                let Ok(block) = bincode::deserialize::<Block>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                self.peers.broadcast(frame.clone(), Some(peer)).await;
                self.relay_to_disconnected_validators(&frame, Some(peer)).await;
                let _ = consensus_in.send(ConsensusInput::Proposal(block)).await;
            }
            MessageType::Prevote => {
                let Ok(vote) = bincode::deserialize::<VoteMessage>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                self.peers.broadcast(frame, Some(peer)).await;
                let _ = consensus_in.send(ConsensusInput::Prevote(vote)).await;
            }
            MessageType::Precommit => {
                let Ok(vote) = bincode::deserialize::<VoteMessage>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                self.peers.broadcast(frame, Some(peer)).await;
                let _ = consensus_in.send(ConsensusInput::Precommit(vote)).await;
            }
            MessageType::ValidatorUpdate => {
                if !self.gossip.should_deliver(GossipRouter::dedup_key(&frame)) {
                    return;
                }
                let Ok(update) = bincode::deserialize::<ValidatorUpdateWire>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                let result = match update {
                    ValidatorUpdateWire::Registered { address, stake, moniker } => {
                        self.validators.register(address, stake, moniker)
                    }
                    ValidatorUpdateWire::Activated { address } => self.validators.activate(&address),
                };
                match result {
                    Ok(()) => {
                        self.peers.broadcast(frame.clone(), Some(peer)).await;
                        self.relay_to_disconnected_validators(&frame, Some(peer)).await;
                    }
                    Err(err) => debug!(target: LOG_TARGET, %err, "ignoring gossiped validator update"),
                }
            }
            MessageType::RelayEnvelope => {
                let Ok(envelope) = bincode::deserialize::<RelayEnvelopeWire>(&frame.data) else {
                    self.peers.record_malformed_frame(peer);
                    return;
                };
                self.handle_relay_envelope(envelope).await;
            }
            MessageType::Handshake
            | MessageType::Version
            | MessageType::Verack
            | MessageType::Addr
            | MessageType::GetAddr
            | MessageType::HolePunch
            | MessageType::Pong => {
                // Session lifecycle; HolePunch traffic runs over its own UDP
                // socket (§4.4), never as a framed TCP message, so there's
                // nothing left for the Integrator to do here.
            }
        }
    }

    /// Delivers any envelopes [`MessageRelay`] queued for `peer` while it
    /// was unreachable, now that it's shown signs of life (§4.4 "once it
    /// reconnects").
    async fn flush_relayed_messages(&self, peer: PeerID) {
        self.relay.note_seen(peer, now_unix());
        for message in self.relay.take_pending(&peer) {
            let envelope = RelayEnvelopeWire {
                id: message.id,
                src: message.src,
                dst: message.dst,
                payload: message.payload,
                encrypted: message.encrypted,
                ttl: message.ttl,
            };
            let payload = bincode::serialize(&envelope).expect("RelayEnvelopeWire always serializes");
            self.peers.send(peer, Frame::new(MessageType::RelayEnvelope, payload)).await;
        }
    }

    /// Forwards a relay envelope one hop closer to `dst`: delivers it
    /// locally if we are `dst`, forwards directly if `dst` is one of our
    /// connected peers, and otherwise queues it in [`MessageRelay`] for
    /// whenever `dst` is next seen.
    async fn handle_relay_envelope(&self, envelope: RelayEnvelopeWire) {
        if envelope.dst == self.local_id {
            debug!(target: LOG_TARGET, src = %envelope.src, "received a relayed message addressed to us");
            return;
        }
        let payload = bincode::serialize(&envelope).expect("RelayEnvelopeWire always serializes");
        if self.peers.send(envelope.dst, Frame::new(MessageType::RelayEnvelope, payload)).await {
            return;
        }
        let message = RelayedMessage {
            id: envelope.id,
            src: envelope.src,
            dst: envelope.dst,
            payload: envelope.payload,
            encrypted: envelope.encrypted,
            ttl: envelope.ttl,
            ts: now_unix(),
        };
        if let Err(err) = self.relay.relay(message, now_unix()) {
            debug!(target: LOG_TARGET, %err, dst = %envelope.dst, "dropped relay envelope");
        }
    }

    /// Best-effort store-and-forward of consensus-critical gossip (§4.4) to
    /// validators we've handshaked with before but can't reach directly
    /// right now, routed through one currently-connected peer.
    async fn relay_to_disconnected_validators(&self, frame: &Frame, exclude: Option<PeerID>) {
        let targets = self.peers.disconnected_validator_ids(exclude);
        if targets.is_empty() {
            return;
        }
        let Some(carrier) = self.peers.pick_random_peers(1, exclude).into_iter().next() else { return };
        for dst in targets {
            let envelope = RelayEnvelopeWire {
                id: self.relay.next_id(),
                src: self.local_id,
                dst,
                payload: frame.data.clone(),
                encrypted: false,
                ttl: 8,
            };
            let payload = bincode::serialize(&envelope).expect("RelayEnvelopeWire always serializes");
            self.peers.send(carrier, Frame::new(MessageType::RelayEnvelope, payload)).await;
        }
    }

    async fn dispatch_outbound(&self, mut outbound: mpsc::Receiver<ConsensusOutput>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: LOG_TARGET, "outbound dispatch shutting down");
                    return;
                }
                maybe_out = outbound.recv() => {
                    let Some(output) = maybe_out else { return };
                    self.handle_outbound(output).await;
                }
            }
        }
    }

    async fn handle_outbound(&self, output: ConsensusOutput) {
        match output {
            ConsensusOutput::ProposerSelected { height, round, proposer } => {
                debug!(target: LOG_TARGET, height, round, proposer = %proposer.to_hex(), "proposer selected");
            }
            ConsensusOutput::BroadcastProposal(block) => {
                let frame = Frame::new(MessageType::NewBlock, bincode::serialize(&block).expect("Block always serializes"));
                self.gossip.should_deliver(GossipRouter::dedup_key(&frame));
                self.peers.broadcast(frame.clone(), None).await;
                self.relay_to_disconnected_validators(&frame, None).await;
            }
            ConsensusOutput::BroadcastPrevote(vote) => {
                self.broadcast_vote(MessageType::Prevote, &vote).await;
            }
            ConsensusOutput::BroadcastPrecommit(vote) => {
                self.broadcast_vote(MessageType::Precommit, &vote).await;
            }
            ConsensusOutput::BlockCommitted(block) => {
                self.peers.set_local_height(block.height + 1);
                info!(target: LOG_TARGET, height = block.height, hash = %block.hash, "block committed");
            }
            ConsensusOutput::HeightStalled(height) => {
                warn!(target: LOG_TARGET, height, "height stalled; no proposal reached quorum in any round");
            }
        }
    }

    async fn broadcast_vote(&self, message_type: MessageType, vote: &VoteMessage) {
        let frame = Frame::new(message_type, bincode::serialize(vote).expect("VoteMessage always serializes"));
        self.peers.broadcast(frame, None).await;
    }

    /// §4.1 "maintain at least `minPeers` connections": dials known
    /// addresses we aren't already connected to, each attempt going through
    /// [`PeerManager::connect`]'s NAT hole-punch fallback (§4.4) if the
    /// direct attempt is refused.
    async fn dial_known_peers(&self) {
        if self.peers.connected_count() >= self.network.min_peers {
            return;
        }
        let needed = self.network.min_peers - self.peers.connected_count();
        let candidates = self.peer_store.good_peers(now_unix(), self.peer_store.expiry_days());
        for record in candidates.into_iter().filter(|r| !self.peers.is_connected(&r.address)).take(needed) {
            let peers = self.peers.clone();
            let addr = record.address;
            tokio::spawn(async move {
                if let Err(err) = peers.connect(addr).await {
                    debug!(target: LOG_TARGET, %addr, %err, "outbound connect attempt failed");
                }
            });
        }
    }

    async fn maintenance_loop(&self, mut shutdown: ShutdownSignal) {
        let mut mempool_cleanup = tokio::time::interval(Duration::from_secs(self.mempool_cfg.cleanup_interval_secs));
        let mut mempool_persist = tokio::time::interval(Duration::from_secs(self.mempool_cfg.persistence_interval_secs));
        let mut discovery_tick = tokio::time::interval(Duration::from_secs(self.network.peer_discovery_interval_secs));
        let mut scoring_decay = tokio::time::interval(Duration::from_secs(3600));
        let mut relay_cleanup = tokio::time::interval(Duration::from_secs(self.network.relay_cleanup_interval_secs));
        let mut peer_store_save = tokio::time::interval(Duration::from_secs(300));
        let mut validators_save = tokio::time::interval(Duration::from_secs(300));

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: LOG_TARGET, "maintenance loop shutting down");
                    let _ = self.peer_store.save();
                    if let Err(err) = self.validators.save_snapshot(&self.validators_path) {
                        warn!(target: LOG_TARGET, %err, "failed to persist validator snapshot");
                    }
                    self.mempool.persist_tick().await;
                    return;
                }
                _ = mempool_cleanup.tick() => {
                    self.mempool.expire(now_unix()).await;
                }
                _ = mempool_persist.tick() => {
                    self.mempool.persist_tick().await;
                }
                _ = discovery_tick.tick() => {
                    let discovered = self.discovery.discover(&self.peer_store, now_unix()).await;
                    for addr in discovered {
                        self.peers.add_peer(addr);
                    }
                    self.dial_known_peers().await;
                    let targets = self.peers.pick_random_peers(3, None);
                    let frame = Frame::new(MessageType::GetPeers, Vec::new());
                    for peer in targets {
                        self.peers.send(peer, frame.clone()).await;
                    }
                }
                _ = scoring_decay.tick() => {
                    self.scoring.decay(now_unix());
                }
                _ = relay_cleanup.tick() => {
                    self.relay.cleanup(now_unix());
                }
                _ = peer_store_save.tick() => {
                    if let Err(err) = self.peer_store.save() {
                        warn!(target: LOG_TARGET, %err, "failed to persist peer store");
                    }
                }
                _ = validators_save.tick() => {
                    if let Err(err) = self.validators.save_snapshot(&self.validators_path) {
                        warn!(target: LOG_TARGET, %err, "failed to persist validator snapshot");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_chain::{RewardSchedule, StoreConfig as ChainStoreConfig};
    use ember_crypto::KeyPair;

    async fn test_integrator() -> (Arc<Integrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(
            BlockchainStore::initialize(ChainStoreConfig {
                data_dir: dir.path().join("chain"),
                block_size_limit: 2 * 1024 * 1024,
                reward_schedule: RewardSchedule::new(21.0, 100, 21_000_000.0),
                checkpoint_interval: 100,
                checkpoints_to_keep: 10,
            })
            .unwrap(),
        );
        let transport = Arc::new(TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
        let config = IntegratorConfig {
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            mempool: MempoolConfig::default(),
            distribution: DistributionConfig::default(),
            data_dir: dir.path().to_path_buf(),
            local_id: PeerID::random(),
            local_version: 1,
            min_validator_stake: 1,
            distribution_deadline_height: 1000,
            block_size_limit: 2 * 1024 * 1024,
        };
        let integrator = Integrator::new(config, transport, chain, None).unwrap();
        (integrator, dir)
    }

    #[tokio::test]
    async fn construction_wires_every_subsystem() {
        let (integrator, _dir) = test_integrator().await;
        assert_eq!(integrator.chain().get_height(), None);
        assert_eq!(integrator.validators().active_count(), 0);
    }

    #[tokio::test]
    async fn register_then_activate_validator_succeeds() {
        let (integrator, _dir) = test_integrator().await;
        let address = KeyPair::generate().public();
        integrator.register_validator(address, 10, "node-a".to_string()).await.unwrap();
        integrator.activate_validator(address).await.unwrap();
        assert_eq!(integrator.validators().active_count(), 1);
    }

    #[tokio::test]
    async fn submit_transaction_reaches_the_mempool() {
        let (integrator, _dir) = test_integrator().await;
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate().public();
        let timestamp = 1_700_000_000;
        let payload = Transaction::signing_payload(&sender.public(), &receiver, 1, 1, 1, timestamp);
        let signature = sender.sign(&payload);
        let mut tx = Transaction {
            hash: ember_crypto::Hash::zero(),
            from: sender.public(),
            to: receiver,
            amount: 1,
            fee: 1,
            nonce: 1,
            timestamp,
            signature,
        };
        tx.hash = tx.compute_hash();
        integrator.submit_transaction(tx).await.unwrap();
        assert_eq!(integrator.mempool().pool().len(), 1);
    }
}
