use crate::error::EngineError;
use crate::validator::{Validator, ValidatorManager};
use async_trait::async_trait;
use ember_chain::{Block, Transaction};
use ember_common::config::ConsensusConfig;
use ember_crypto::sig::{KeyPair, PublicKey, Signature};
use ember_crypto::{Hash, H, SIG};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const LOG_TARGET: &str = "ember::consensus::engine";

/// Narrow view of the chain store the engine needs to run rounds. The
/// Integrator implements this over its `Arc<BlockchainStore>`; the engine
/// never constructs a store itself (§5 "single-writer lock across
/// addBlock").
#[async_trait]
pub trait ChainSink: Send + Sync {
    fn height(&self) -> Option<u64>;
    fn tip_hash(&self) -> Hash;
    async fn add_block(&self, block: Block, proposer: &PublicKey) -> Result<(), EngineError>;
}

/// Narrow view of the mempool the engine needs for `pickForBlock` and
/// post-commit pruning (§4.8 steps 2 and 5).
#[async_trait]
pub trait BlockSource: Send + Sync {
    fn pick_for_block(&self, limit: usize, max_bytes: u64) -> Vec<Transaction>;
    async fn remove_committed(&self, txs: &[Transaction]);
}

/// Vote messages exchanged on the wire during `Prevote`/`Precommit`
/// (§4.1's `MessageType::Prevote`/`Precommit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub height: u64,
    pub round: u32,
    pub voter: PublicKey,
    /// `None` is a `nil` vote (§4.8 step 3/4: "or `nil`").
    pub block_hash: Option<Hash>,
    pub signature: Signature,
}

impl VoteMessage {
    fn signing_payload(height: u64, round: u32, block_hash: Option<Hash>) -> Vec<u8> {
        H::digest(&[
            &height.to_be_bytes(),
            &round.to_be_bytes(),
            block_hash.map(|h| *h.as_bytes()).unwrap_or([0u8; 32]).as_slice(),
        ])
        .as_bytes()
        .to_vec()
    }

    pub fn verify(&self) -> bool {
        let payload = Self::signing_payload(self.height, self.round, self.block_hash);
        SIG::verify(&self.voter, &payload, &self.signature).is_ok()
    }
}

/// Messages the Integrator feeds into the engine, decoded off the wire or
/// generated locally (a just-received full block proposal).
#[derive(Debug, Clone)]
pub enum ConsensusInput {
    Proposal(Block),
    Prevote(VoteMessage),
    Precommit(VoteMessage),
}

/// Side effects the engine asks the Integrator to perform: broadcast a
/// message, or notify the rest of the system that something happened.
#[derive(Debug, Clone)]
pub enum ConsensusOutput {
    ProposerSelected { height: u64, round: u32, proposer: PublicKey },
    BroadcastProposal(Block),
    BroadcastPrevote(VoteMessage),
    BroadcastPrecommit(VoteMessage),
    BlockCommitted(Block),
    HeightStalled(u64),
}

/// This node's validator identity, if it runs as one. A full-history /
/// non-validator node drives the engine purely as an observer: it never
/// proposes or votes but still tracks round state to know when blocks
/// finalize.
pub struct ValidatorIdentity {
    pub keypair: KeyPair,
    pub address: PublicKey,
}

enum RoundOutcome {
    Committed,
    TimedOut,
}

/// §4.8 Consensus Engine (rPoS): single-threaded round state machine. One
/// instance per node; `run` owns the task for as long as the node runs.
pub struct ConsensusEngine<C: ChainSink, B: BlockSource> {
    config: ConsensusConfig,
    /// `StorageConfig::block_size_limit_bytes` (§4.8 step 2: the block a
    /// proposer builds must respect the same `blockSizeLimit` the store
    /// enforces on `addBlock`, not just the mempool's own count/byte caps).
    block_size_limit: u64,
    validators: Arc<ValidatorManager>,
    chain: Arc<C>,
    mempool: Arc<B>,
    identity: Option<ValidatorIdentity>,
}

impl<C: ChainSink, B: BlockSource> ConsensusEngine<C, B> {
    pub fn new(
        config: ConsensusConfig,
        block_size_limit: u64,
        validators: Arc<ValidatorManager>,
        chain: Arc<C>,
        mempool: Arc<B>,
        identity: Option<ValidatorIdentity>,
    ) -> Self {
        ConsensusEngine {
            config,
            block_size_limit,
            validators,
            chain,
            mempool,
            identity,
        }
    }

    /// Drives rounds forever, reading wire-decoded votes/proposals from
    /// `inbound` and emitting side effects on `outbound`, until
    /// `shutdown` resolves.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<ConsensusInput>,
        outbound: mpsc::Sender<ConsensusOutput>,
        mut shutdown: ember_shutdown::ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: LOG_TARGET, "consensus engine shutting down");
                    return;
                }
                _ = self.run_height(&mut inbound, &outbound) => {}
            }
        }
    }

    async fn run_height(&self, inbound: &mut mpsc::Receiver<ConsensusInput>, outbound: &mpsc::Sender<ConsensusOutput>) {
        let height = self.chain.height().map(|h| h + 1).unwrap_or(0);
        let mut round: u32 = 0;
        loop {
            self.validators.try_unjail(height);
            let mut participated = Vec::new();
            let outcome = self.run_round(height, round, inbound, outbound, &mut participated).await;
            // §4.7 reputation decay: validators who neither proposed nor voted
            // this round drift back toward the neutral baseline, whatever the
            // round's outcome.
            self.validators.decay_inactive(&participated);
            match outcome {
                RoundOutcome::Committed => return,
                RoundOutcome::TimedOut => {
                    round += 1;
                    if round >= self.config.max_round {
                        warn!(target: LOG_TARGET, height, "height stalled after exhausting all rounds");
                        let _ = outbound.send(ConsensusOutput::HeightStalled(height)).await;
                        return;
                    }
                }
            }
        }
    }

    async fn run_round(
        &self,
        height: u64,
        round: u32,
        inbound: &mut mpsc::Receiver<ConsensusInput>,
        outbound: &mpsc::Sender<ConsensusOutput>,
        participated: &mut Vec<PublicKey>,
    ) -> RoundOutcome {
        let active = self.validators.active_validators();
        let seed = H::digest(&[self.chain.tip_hash().as_bytes(), &height.to_be_bytes(), &round.to_be_bytes()]);
        let Some(proposer) = self.validators.select_validator(&seed) else {
            warn!(target: LOG_TARGET, height, round, "no eligible validators; cannot select a proposer");
            return RoundOutcome::TimedOut;
        };
        participated.push(proposer);
        let _ = outbound
            .send(ConsensusOutput::ProposerSelected { height, round, proposer })
            .await;

        let proposal = match self.obtain_proposal(height, &proposer, inbound, outbound).await {
            Some(block) => block,
            None => return RoundOutcome::TimedOut,
        };

        let Some((prevote_weight, voters)) = self
            .collect_votes(height, round, &active, Phase::Prevote, Some(proposal.hash), inbound, outbound)
            .await
        else {
            return RoundOutcome::TimedOut;
        };
        participated.extend(voters);

        let total = total_weight(&active);
        if !has_quorum(prevote_weight, total, self.config.finalization_threshold) {
            return RoundOutcome::TimedOut;
        }

        let Some((precommit_weight, voters)) = self
            .collect_votes(height, round, &active, Phase::Precommit, Some(proposal.hash), inbound, outbound)
            .await
        else {
            return RoundOutcome::TimedOut;
        };
        participated.extend(voters);

        if !has_quorum(precommit_weight, total, self.config.finalization_threshold) {
            return RoundOutcome::TimedOut;
        }

        self.finalize(height, proposal, &proposer, outbound).await
    }

    async fn obtain_proposal(
        &self,
        height: u64,
        proposer: &PublicKey,
        inbound: &mut mpsc::Receiver<ConsensusInput>,
        outbound: &mpsc::Sender<ConsensusOutput>,
    ) -> Option<Block> {
        let we_propose = self.identity.as_ref().map(|id| &id.address == proposer).unwrap_or(false);
        if we_propose {
            let block = self.build_proposal(height, proposer);
            let _ = outbound.send(ConsensusOutput::BroadcastProposal(block.clone())).await;
            return Some(block);
        }

        let timeout = Duration::from_secs(self.config.block_proposal_timeout_secs);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return None,
                maybe_msg = inbound.recv() => {
                    match maybe_msg {
                        Some(ConsensusInput::Proposal(block)) if self.is_valid_proposal(&block, height, proposer) => {
                            return Some(block);
                        }
                        Some(_) => continue,
                        None => return None,
                    }
                }
            }
        }
    }

    fn build_proposal(&self, height: u64, proposer: &PublicKey) -> Block {
        let identity = self.identity.as_ref().expect("we_propose implies an identity");
        let previous_hash = self.chain.tip_hash();
        let transactions = self.mempool.pick_for_block(usize::MAX, self.block_size_limit);
        let merkle_root = Block::compute_merkle_root(&transactions);
        let timestamp = now_unix();
        let hash = Block::compute_hash(height, &previous_hash, timestamp, proposer, &merkle_root);
        let signature = identity.keypair.sign(hash.as_bytes());
        Block {
            height,
            previous_hash,
            timestamp,
            transactions,
            proposer: *proposer,
            signature,
            hash,
            merkle_root,
        }
    }

    /// §4.8 step 3: "A block is valid iff: height matches, previousHash
    /// matches, signature verifies against P, timestamp strictly > parent,
    /// all txs valid, size within limit."
    fn is_valid_proposal(&self, block: &Block, expected_height: u64, proposer: &PublicKey) -> bool {
        if block.height != expected_height || block.proposer != *proposer {
            return false;
        }
        if block.previous_hash != self.chain.tip_hash() {
            return false;
        }
        if block.hash != block.signing_payload() {
            return false;
        }
        if SIG::verify(proposer, block.hash.as_bytes(), &block.signature).is_err() {
            return false;
        }
        block.transactions.iter().all(|tx| tx.verify_signature())
    }

    /// Collects a single phase's votes until quorum or timeout, applying
    /// equivocation detection as votes arrive; returns the winning weight
    /// if the phase resolves before timeout.
    async fn collect_votes(
        &self,
        height: u64,
        round: u32,
        active: &[Validator],
        phase: Phase,
        target: Option<Hash>,
        inbound: &mut mpsc::Receiver<ConsensusInput>,
        outbound: &mpsc::Sender<ConsensusOutput>,
    ) -> Option<(f64, Vec<PublicKey>)> {
        let mut votes: HashMap<PublicKey, Option<Hash>> = HashMap::new();

        if let Some(identity) = &self.identity {
            if active.iter().any(|v| v.address == identity.address) {
                let our_vote = target;
                let msg = self.sign_vote(identity, height, round, our_vote);
                votes.insert(identity.address, our_vote);
                let _ = match phase {
                    Phase::Prevote => outbound.send(ConsensusOutput::BroadcastPrevote(msg)).await,
                    Phase::Precommit => outbound.send(ConsensusOutput::BroadcastPrecommit(msg)).await,
                };
            }
        }

        let total = total_weight(active);
        let threshold = self.config.finalization_threshold;
        if target.is_some() && has_quorum(tally_weight(&votes, target, active), total, threshold) {
            let weight = tally_weight(&votes, target, active);
            return Some((weight, votes.keys().copied().collect()));
        }

        let timeout = Duration::from_secs(self.config.voting_timeout_secs);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    let weight = tally_weight(&votes, target, active);
                    return if has_quorum(weight, total, threshold) {
                        Some((weight, votes.keys().copied().collect()))
                    } else {
                        None
                    };
                }
                maybe_msg = inbound.recv() => {
                    let Some(msg) = maybe_msg else { return None };
                    let vote = match (msg, phase) {
                        (ConsensusInput::Prevote(v), Phase::Prevote) => v,
                        (ConsensusInput::Precommit(v), Phase::Precommit) => v,
                        _ => continue,
                    };
                    if vote.height != height || vote.round != round || !vote.verify() {
                        continue;
                    }
                    if !active.iter().any(|v| v.address == vote.voter) {
                        continue;
                    }
                    match votes.get(&vote.voter) {
                        Some(existing) if *existing != vote.block_hash => {
                            warn!(target: LOG_TARGET, voter = %vote.voter.to_hex(), height, round, "equivocation detected, tombstoning");
                            let _ = self.validators.record_equivocation(&vote.voter);
                            votes.remove(&vote.voter);
                            continue;
                        }
                        Some(_) => continue,
                        None => {}
                    }
                    votes.insert(vote.voter, vote.block_hash);
                    let weight = tally_weight(&votes, target, active);
                    if has_quorum(weight, total, threshold) {
                        return Some((weight, votes.keys().copied().collect()));
                    }
                }
            }
        }
    }

    fn sign_vote(&self, identity: &ValidatorIdentity, height: u64, round: u32, block_hash: Option<Hash>) -> VoteMessage {
        let payload = VoteMessage::signing_payload(height, round, block_hash);
        let signature = identity.keypair.sign(&payload);
        VoteMessage {
            height,
            round,
            voter: identity.address,
            block_hash,
            signature,
        }
    }

    async fn finalize(&self, height: u64, block: Block, proposer: &PublicKey, outbound: &mpsc::Sender<ConsensusOutput>) -> RoundOutcome {
        match self.chain.add_block(block.clone(), proposer).await {
            Ok(()) => {
                self.mempool.remove_committed(&block.transactions).await;
                let bonus = self.validators.record_proposal(proposer, true, height).unwrap_or(0);
                if bonus > 0 {
                    info!(target: LOG_TARGET, proposer = %proposer.to_hex(), bonus, "distribution bonus earned");
                }
                info!(target: LOG_TARGET, height, hash = %block.hash, "block committed");
                let _ = outbound.send(ConsensusOutput::BlockCommitted(block)).await;
                RoundOutcome::Committed
            }
            Err(err) => {
                warn!(target: LOG_TARGET, height, error = %err, "store rejected finalized block");
                let _ = self.validators.record_proposal(proposer, false, height);
                RoundOutcome::TimedOut
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Prevote,
    Precommit,
}

fn total_weight(active: &[Validator]) -> f64 {
    active.iter().map(|v| v.voting_power()).sum()
}

fn tally_weight(votes: &HashMap<PublicKey, Option<Hash>>, target: Option<Hash>, active: &[Validator]) -> f64 {
    votes
        .iter()
        .filter(|(_, v)| **v == target && target.is_some())
        .filter_map(|(addr, _)| active.iter().find(|v| v.address == *addr))
        .map(|v| v.voting_power())
        .sum()
}

fn has_quorum(weight: f64, total: f64, threshold: f64) -> bool {
    total > 0.0 && weight / total >= threshold
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(stake: u64) -> Validator {
        let kp = KeyPair::generate();
        crate::validator::test_support::active_validator(kp.public(), stake)
    }

    #[test]
    fn quorum_requires_two_thirds_by_default() {
        assert!(!has_quorum(66.0, 100.0, 2.0 / 3.0));
        assert!(has_quorum(67.0, 100.0, 2.0 / 3.0));
    }

    #[test]
    fn tally_weight_only_counts_matching_votes() {
        let a = validator(100);
        let b = validator(50);
        let target = H::digest_one(b"block");
        let mut votes = HashMap::new();
        votes.insert(a.address, Some(target));
        votes.insert(b.address, None);
        let weight = tally_weight(&votes, Some(target), &[a, b]);
        assert_eq!(weight, 100.0);
    }

    #[test]
    fn no_target_never_reaches_quorum() {
        let a = validator(100);
        let votes = HashMap::new();
        let weight = tally_weight(&votes, None, &[a]);
        assert_eq!(weight, 0.0);
    }
}
