use async_trait::async_trait;
use ember_chain::{Block, BlockchainStore, Transaction};
use ember_consensus::{BlockSource, ChainSink, EngineError};
use ember_crypto::sig::PublicKey;
use ember_crypto::Hash;
use ember_mempool::{Mempool, NonceSource};
use std::sync::Arc;

/// Adapts [`BlockchainStore`] to the narrow views `ember_mempool::NonceSource`
/// and `ember_consensus::ChainSink` require. Neither trait nor the concrete
/// store type is local to `ember_mempool` or `ember_consensus`, so the impls
/// have to live here, the one crate that legitimately depends on both.
pub struct ChainStoreSink(pub Arc<BlockchainStore>);

impl NonceSource for ChainStoreSink {
    fn last_committed_nonce(&self, address: &PublicKey) -> u64 {
        self.0.last_committed_nonce(address)
    }
}

#[async_trait]
impl ChainSink for ChainStoreSink {
    fn height(&self) -> Option<u64> {
        self.0.get_height()
    }

    fn tip_hash(&self) -> Hash {
        self.0.tip_hash()
    }

    async fn add_block(&self, block: Block, proposer: &PublicKey) -> Result<(), EngineError> {
        self.0.add_block(block, proposer).await.map_err(EngineError::from)
    }
}

/// Adapts [`Mempool`] to the narrow `ember_consensus::BlockSource` view, for
/// the same orphan-rule reason as [`ChainStoreSink`].
pub struct MempoolBlockSource<N: NonceSource>(pub Arc<Mempool<N>>);

#[async_trait]
impl<N: NonceSource + 'static> BlockSource for MempoolBlockSource<N> {
    fn pick_for_block(&self, limit: usize, max_bytes: u64) -> Vec<Transaction> {
        self.0.pick_for_block(limit, max_bytes)
    }

    async fn remove_committed(&self, txs: &[Transaction]) {
        self.0.remove_committed(txs).await;
    }
}
