//! §4.5 Mempool: the bounded, nonce-ordered pool of pending transactions
//! that feeds block proposals, plus its Redis-compatible durability layer.

pub mod error;
pub mod persistence;
pub mod pool;

pub use error::MempoolError;
pub use persistence::MempoolPersistence;
pub use pool::{NonceSource, PoolConfig, TransactionPool};

use ember_chain::Transaction;
use tracing::info;

const LOG_TARGET: &str = "ember::mempool";

/// Ties the in-memory [`TransactionPool`] to its [`MempoolPersistence`]
/// spill-over, mirroring how the Integrator wires a worker to its store.
pub struct Mempool<N: NonceSource> {
    pool: TransactionPool<N>,
    persistence: MempoolPersistence,
}

impl<N: NonceSource> Mempool<N> {
    pub fn new(config: PoolConfig, nonce_source: N, persistence: MempoolPersistence) -> Self {
        Mempool {
            pool: TransactionPool::new(config, nonce_source),
            persistence,
        }
    }

    /// Replays the durable snapshot into the in-memory pool on startup.
    /// Entries the pool itself rejects (stale nonce, already committed) are
    /// dropped silently; they were only ever a best-effort cache.
    pub async fn restore(&self, now: u64) {
        let snapshot = self.persistence.load_all().await;
        let restored = snapshot.len();
        let mut kept = 0;
        for tx in snapshot {
            if self.pool.add(tx, now).is_ok() {
                kept += 1;
            }
        }
        info!(target: LOG_TARGET, restored, kept, "mempool snapshot restored");
    }

    pub async fn submit(&self, tx: Transaction, now: u64) -> Result<(), MempoolError> {
        self.pool.add(tx, now)?;
        Ok(())
    }

    pub async fn remove_committed(&self, txs: &[Transaction]) {
        self.pool.remove_committed(txs);
    }

    /// Cleanup sweep: expires stale entries from the in-memory pool (§4.5's
    /// cleanup timer). The durable mirror catches up at the next
    /// `persist_tick` rather than being touched per expiry.
    pub async fn expire(&self, now: u64) {
        let expired = self.pool.expire(now);
        if !expired.is_empty() {
            info!(target: LOG_TARGET, count = expired.len(), "expired stale mempool entries");
        }
    }

    /// §4.5 "every `persistenceInterval`, snapshot pool to an external KV":
    /// overwrites the durable mirror with the pool's exact current
    /// contents. Driven by the Integrator's maintenance loop on
    /// `MempoolConfig::persistence_interval_secs`.
    pub async fn persist_tick(&self) {
        self.persistence.replace_all(&self.pool.all()).await;
    }

    pub fn pick_for_block(&self, limit: usize, max_bytes: u64) -> Vec<Transaction> {
        self.pool.pick_for_block(limit, max_bytes)
    }

    pub fn pool(&self) -> &TransactionPool<N> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::{KeyPair, PublicKey};

    struct ZeroNonce;
    impl NonceSource for ZeroNonce {
        fn last_committed_nonce(&self, _address: &PublicKey) -> u64 {
            0
        }
    }

    fn make_tx(kp: &KeyPair, to: &PublicKey, nonce: u64) -> Transaction {
        let timestamp = 1_700_000_000 + nonce;
        let payload = Transaction::signing_payload(&kp.public(), to, 1, 1, nonce, timestamp);
        let signature = kp.sign(&payload);
        let mut tx = Transaction {
            hash: ember_crypto::Hash::zero(),
            from: kp.public(),
            to: *to,
            amount: 1,
            fee: 1,
            nonce,
            timestamp,
            signature,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    #[tokio::test]
    async fn submit_without_persistence_backend_still_accepts() {
        let mempool = Mempool::new(PoolConfig::default(), ZeroNonce, MempoolPersistence::disabled());
        let sender = KeyPair::generate();
        let to = KeyPair::generate().public();
        mempool.submit(make_tx(&sender, &to, 1), 0).await.unwrap();
        assert_eq!(mempool.pool().len(), 1);
    }

    #[tokio::test]
    async fn persist_tick_without_a_kv_backend_is_a_harmless_no_op() {
        let mempool = Mempool::new(PoolConfig::default(), ZeroNonce, MempoolPersistence::disabled());
        let sender = KeyPair::generate();
        let to = KeyPair::generate().public();
        mempool.submit(make_tx(&sender, &to, 1), 0).await.unwrap();
        mempool.persist_tick().await;
        assert_eq!(mempool.pool().len(), 1);
    }

    #[tokio::test]
    async fn remove_committed_drops_from_pool() {
        let mempool = Mempool::new(PoolConfig::default(), ZeroNonce, MempoolPersistence::disabled());
        let sender = KeyPair::generate();
        let to = KeyPair::generate().public();
        let tx = make_tx(&sender, &to, 1);
        mempool.submit(tx.clone(), 0).await.unwrap();
        mempool.remove_committed(&[tx]).await;
        assert_eq!(mempool.pool().len(), 0);
    }
}
