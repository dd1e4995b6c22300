use crate::error::MempoolError;
use ember_chain::Transaction;
use ember_crypto::sig::PublicKey;
use ember_crypto::Hash;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::RwLock;
use tracing::debug;

const LOG_TARGET: &str = "ember::mempool::pool";

/// Narrow read-only view into committed account state the pool needs for
/// nonce discipline. Implemented by whatever owns `BlockchainStore` (the
/// Integrator); the mempool never reaches into the chain store directly.
pub trait NonceSource: Send + Sync {
    fn last_committed_nonce(&self, address: &PublicKey) -> u64;
}

#[derive(Debug, Clone)]
struct PooledTx {
    tx: Transaction,
    received_at: u64,
}

pub struct PoolConfig {
    pub max_transactions: usize,
    pub max_size_bytes: u64,
    pub expiration_time_secs: u64,
    pub min_fee: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_transactions: 5_000,
            max_size_bytes: 32 * 1024 * 1024,
            expiration_time_secs: 3 * 3600,
            min_fee: 0,
        }
    }
}

struct PoolState {
    by_hash: HashMap<Hash, PooledTx>,
    /// Per-sender nonce -> tx hash, kept sorted so "highest pending nonce"
    /// and "next expected nonce" are cheap to compute (§4.5 invariants).
    by_sender: HashMap<PublicKey, BTreeMap<u64, Hash>>,
    total_size_bytes: u64,
}

/// §4.5 TransactionPool: bounded, nonce-ordered set of pending transactions.
pub struct TransactionPool<N: NonceSource> {
    config: PoolConfig,
    nonce_source: N,
    state: RwLock<PoolState>,
}

impl<N: NonceSource> TransactionPool<N> {
    pub fn new(config: PoolConfig, nonce_source: N) -> Self {
        TransactionPool {
            config,
            nonce_source,
            state: RwLock::new(PoolState {
                by_hash: HashMap::new(),
                by_sender: HashMap::new(),
                total_size_bytes: 0,
            }),
        }
    }

    fn expected_next_nonce(state: &PoolState, sender: &PublicKey, committed: u64) -> u64 {
        state
            .by_sender
            .get(sender)
            .and_then(|chain| chain.keys().next_back())
            .map(|highest| highest + 1)
            .unwrap_or(committed + 1)
    }

    pub fn add(&self, tx: Transaction, now: u64) -> Result<(), MempoolError> {
        if !tx.verify_signature() {
            return Err(MempoolError::InvalidSignature);
        }
        if tx.fee < self.config.min_fee {
            return Err(MempoolError::InsufficientFee {
                fee: tx.fee,
                min_fee: self.config.min_fee,
            });
        }

        let mut state = self.state.write().unwrap();
        if state.by_hash.contains_key(&tx.hash) {
            return Err(MempoolError::Duplicate);
        }
        let committed = self.nonce_source.last_committed_nonce(&tx.from);
        let expected = Self::expected_next_nonce(&state, &tx.from, committed);
        if tx.nonce != expected {
            return Err(MempoolError::NonceTooLow {
                expected,
                got: tx.nonce,
            });
        }

        let size = tx.encoded_size() as u64;
        let would_exceed_count = state.by_hash.len() >= self.config.max_transactions;
        let would_exceed_bytes = state.total_size_bytes + size > self.config.max_size_bytes;
        if would_exceed_count || would_exceed_bytes {
            if !Self::evict_one(&mut state) {
                return Err(MempoolError::PoolFull);
            }
        }

        state.by_sender.entry(tx.from).or_default().insert(tx.nonce, tx.hash);
        state.total_size_bytes += size;
        debug!(target: LOG_TARGET, hash = %tx.hash, nonce = tx.nonce, "transaction accepted");
        state.by_hash.insert(
            tx.hash,
            PooledTx {
                tx,
                received_at: now,
            },
        );
        Ok(())
    }

    /// Evicts the lowest-fee transaction among each sender's *tail* entry
    /// (highest pending nonce), so eviction never opens a nonce gap (§4.5).
    fn evict_one(state: &mut PoolState) -> bool {
        let mut candidate: Option<(u64, PublicKey, u64, Hash)> = None; // (fee, sender, nonce, hash)
        for (sender, chain) in state.by_sender.iter() {
            if let Some((&nonce, &hash)) = chain.iter().next_back() {
                if let Some(pooled) = state.by_hash.get(&hash) {
                    let fee = pooled.tx.fee;
                    let replace = match &candidate {
                        Some((best_fee, ..)) => fee < *best_fee,
                        None => true,
                    };
                    if replace {
                        candidate = Some((fee, *sender, nonce, hash));
                    }
                }
            }
        }
        match candidate {
            Some((_, sender, nonce, hash)) => {
                Self::remove_locked(state, &hash, &sender, nonce);
                true
            }
            None => false,
        }
    }

    fn remove_locked(state: &mut PoolState, hash: &Hash, sender: &PublicKey, nonce: u64) {
        if let Some(pooled) = state.by_hash.remove(hash) {
            state.total_size_bytes = state.total_size_bytes.saturating_sub(pooled.tx.encoded_size() as u64);
        }
        if let Some(chain) = state.by_sender.get_mut(sender) {
            chain.remove(&nonce);
            if chain.is_empty() {
                state.by_sender.remove(sender);
            }
        }
    }

    pub fn remove(&self, hash: &Hash) -> bool {
        let mut state = self.state.write().unwrap();
        let Some(pooled) = state.by_hash.get(hash).cloned() else {
            return false;
        };
        Self::remove_locked(&mut state, hash, &pooled.tx.from, pooled.tx.nonce);
        true
    }

    /// Drops every pending transaction belonging to `txs`, used after a
    /// block finalizes (§4.8 step 5: `Mempool.removeCommitted(block.txs)`).
    pub fn remove_committed(&self, txs: &[Transaction]) {
        let mut state = self.state.write().unwrap();
        for tx in txs {
            Self::remove_locked(&mut state, &tx.hash, &tx.from, tx.nonce);
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.state.read().unwrap().by_hash.get(hash).map(|p| p.tx.clone())
    }

    pub fn get_by_sender(&self, sender: &PublicKey) -> Vec<Transaction> {
        let state = self.state.read().unwrap();
        state
            .by_sender
            .get(sender)
            .map(|chain| {
                chain
                    .values()
                    .filter_map(|h| state.by_hash.get(h).map(|p| p.tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.state.read().unwrap().by_hash.values().map(|p| p.tx.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.state.read().unwrap().total_size_bytes
    }

    /// Drops entries older than `expirationTime`. Because removing a
    /// mid-chain nonce would otherwise strand later nonces behind a gap,
    /// expiry cascades: once a sender's earliest pending nonce expires,
    /// the rest of that sender's chain expires with it.
    pub fn expire(&self, now: u64) -> Vec<Hash> {
        let mut state = self.state.write().unwrap();
        let mut expired = Vec::new();
        let senders: Vec<PublicKey> = state.by_sender.keys().copied().collect();
        for sender in senders {
            let mut cut = false;
            let nonces: Vec<u64> = state
                .by_sender
                .get(&sender)
                .map(|c| c.keys().copied().collect())
                .unwrap_or_default();
            for nonce in nonces {
                let hash = state.by_sender.get(&sender).and_then(|c| c.get(&nonce).copied());
                let Some(hash) = hash else { continue };
                let is_expired = state
                    .by_hash
                    .get(&hash)
                    .map(|p| now.saturating_sub(p.received_at) > self.config.expiration_time_secs)
                    .unwrap_or(false);
                if is_expired {
                    cut = true;
                }
                if cut {
                    Self::remove_locked(&mut state, &hash, &sender, nonce);
                    expired.push(hash);
                }
            }
        }
        expired
    }

    /// §4.5 `pickForBlock`: highest-fee-first selection respecting each
    /// sender's nonce continuity, bounded by `limit` transactions and
    /// `maxBytes` total size.
    pub fn pick_for_block(&self, limit: usize, max_bytes: u64) -> Vec<Transaction> {
        let state = self.state.read().unwrap();
        let mut cursors: HashMap<PublicKey, u64> = HashMap::new();
        let mut heap: BinaryHeap<Ready> = BinaryHeap::new();

        for (sender, chain) in state.by_sender.iter() {
            if let Some((&nonce, &hash)) = chain.iter().next() {
                if let Some(pooled) = state.by_hash.get(&hash) {
                    heap.push(Ready {
                        fee: pooled.tx.fee,
                        hash,
                        sender: *sender,
                        nonce,
                    });
                    cursors.insert(*sender, nonce);
                }
            }
        }

        let mut chosen = Vec::new();
        let mut size_used = 0u64;
        while let Some(Ready { hash, sender, nonce, .. }) = heap.pop() {
            if chosen.len() >= limit {
                break;
            }
            let Some(pooled) = state.by_hash.get(&hash) else { continue };
            let size = pooled.tx.encoded_size() as u64;
            if size_used + size > max_bytes {
                continue;
            }
            chosen.push(pooled.tx.clone());
            size_used += size;

            if let Some(chain) = state.by_sender.get(&sender) {
                if let Some((&next_nonce, &next_hash)) = chain.range((nonce + 1)..).next() {
                    if next_nonce == nonce + 1 {
                        if let Some(next_pooled) = state.by_hash.get(&next_hash) {
                            heap.push(Ready {
                                fee: next_pooled.tx.fee,
                                hash: next_hash,
                                sender,
                                nonce: next_nonce,
                            });
                        }
                    }
                }
            }
            cursors.insert(sender, nonce);
        }
        let _ = cursors;
        chosen
    }
}

#[derive(Eq, PartialEq)]
struct Ready {
    fee: u64,
    hash: Hash,
    sender: PublicKey,
    nonce: u64,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fee.cmp(&other.fee).then_with(|| other.nonce.cmp(&self.nonce))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::KeyPair;

    struct FixedNonce(u64);
    impl NonceSource for FixedNonce {
        fn last_committed_nonce(&self, _address: &PublicKey) -> u64 {
            self.0
        }
    }

    fn make_tx(kp: &KeyPair, to: &PublicKey, nonce: u64, fee: u64) -> Transaction {
        let timestamp = 1_700_000_000 + nonce;
        let payload = Transaction::signing_payload(&kp.public(), to, 1, fee, nonce, timestamp);
        let signature = kp.sign(&payload);
        let mut tx = Transaction {
            hash: Hash::zero(),
            from: kp.public(),
            to: *to,
            amount: 1,
            fee,
            nonce,
            timestamp,
            signature,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    #[test]
    fn s2_nonce_rejection_scenario() {
        let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(5));
        let sender = KeyPair::generate();
        let to = KeyPair::generate().public();

        assert_eq!(
            pool.add(make_tx(&sender, &to, 4, 1), 0),
            Err(MempoolError::NonceTooLow { expected: 6, got: 4 })
        );
        assert_eq!(
            pool.add(make_tx(&sender, &to, 7, 1), 0),
            Err(MempoolError::NonceTooLow { expected: 6, got: 7 })
        );
        assert!(pool.add(make_tx(&sender, &to, 6, 1), 0).is_ok());
        assert!(pool.add(make_tx(&sender, &to, 7, 1), 0).is_ok());
    }

    #[test]
    fn duplicate_hash_is_rejected() {
        let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(0));
        let sender = KeyPair::generate();
        let to = KeyPair::generate().public();
        let tx = make_tx(&sender, &to, 1, 5);
        assert!(pool.add(tx.clone(), 0).is_ok());
        assert_eq!(pool.add(tx, 0), Err(MempoolError::Duplicate));
    }

    #[test]
    fn pick_for_block_prefers_higher_fee_senders_first() {
        let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(0));
        let to = KeyPair::generate().public();
        let rich = KeyPair::generate();
        let poor = KeyPair::generate();
        pool.add(make_tx(&rich, &to, 1, 100), 0).unwrap();
        pool.add(make_tx(&poor, &to, 1, 1), 0).unwrap();

        let picked = pool.pick_for_block(10, u64::MAX);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].from, rich.public());
    }

    #[test]
    fn pick_for_block_respects_nonce_continuity_per_sender() {
        let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(0));
        let to = KeyPair::generate().public();
        let sender = KeyPair::generate();
        pool.add(make_tx(&sender, &to, 1, 1), 0).unwrap();
        pool.add(make_tx(&sender, &to, 2, 50), 0).unwrap();

        // Even though nonce=2 has a much higher fee, nonce=1 must come first.
        let picked = pool.pick_for_block(1, u64::MAX);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].nonce, 1);
    }

    #[test]
    fn remove_committed_drops_only_named_transactions() {
        let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(0));
        let to = KeyPair::generate().public();
        let sender = KeyPair::generate();
        let tx1 = make_tx(&sender, &to, 1, 1);
        pool.add(tx1.clone(), 0).unwrap();
        assert_eq!(pool.len(), 1);
        pool.remove_committed(&[tx1]);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn pool_bound_holds_under_pressure() {
        let config = PoolConfig {
            max_transactions: 2,
            ..PoolConfig::default()
        };
        let pool = TransactionPool::new(config, FixedNonce(0));
        let to = KeyPair::generate().public();
        let low = KeyPair::generate();
        let mid = KeyPair::generate();
        let high = KeyPair::generate();
        pool.add(make_tx(&low, &to, 1, 1), 0).unwrap();
        pool.add(make_tx(&mid, &to, 1, 5), 0).unwrap();
        pool.add(make_tx(&high, &to, 1, 10), 0).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(pool.get_by_sender(&low.public()).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn pick_for_block_never_skips_a_sender_nonce(
            nonces in proptest::collection::vec(1u64..8, 1..6),
            fees in proptest::collection::vec(1u64..100, 1..6),
        ) {
            let pool = TransactionPool::new(PoolConfig::default(), FixedNonce(0));
            let to = KeyPair::generate().public();
            let sender = KeyPair::generate();

            // Build a contiguous 1..=n nonce chain (de-duplicated, sorted) so
            // every add() call is itself valid per the pool's own discipline.
            let mut unique: Vec<u64> = nonces.clone();
            unique.sort_unstable();
            unique.dedup();
            let n = unique.len().min(fees.len()).max(1);
            for i in 0..n {
                let tx = make_tx(&sender, &to, (i as u64) + 1, fees[i % fees.len()]);
                pool.add(tx, 0).unwrap();
            }

            let picked = pool.pick_for_block(n, u64::MAX);
            let picked_nonces: Vec<u64> = picked.iter().map(|t| t.nonce).collect();
            let expected: Vec<u64> = (1..=n as u64).collect();
            proptest::prop_assert_eq!(picked_nonces, expected);
        }
    }
}
