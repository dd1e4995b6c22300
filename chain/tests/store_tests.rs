use ember_chain::{BlockchainStore, RewardSchedule, StoreConfig};
use ember_chain::types::{Block, Transaction};
use ember_crypto::sig::PublicKey;
use ember_crypto::{Hash, KeyPair};

fn config(dir: &std::path::Path) -> StoreConfig {
    StoreConfig {
        data_dir: dir.to_path_buf(),
        block_size_limit: 2 * 1024 * 1024,
        reward_schedule: RewardSchedule::new(21.0, 100, 21_000_000.0),
        checkpoint_interval: 5,
        checkpoints_to_keep: 10,
    }
}

fn mine_block(proposer: &KeyPair, height: u64, previous_hash: Hash, timestamp: u64) -> Block {
    mine_block_with_txs(proposer, height, previous_hash, timestamp, vec![])
}

fn mine_block_with_txs(
    proposer: &KeyPair,
    height: u64,
    previous_hash: Hash,
    timestamp: u64,
    transactions: Vec<Transaction>,
) -> Block {
    let merkle_root = Block::compute_merkle_root(&transactions);
    let hash = Block::compute_hash(height, &previous_hash, timestamp, &proposer.public(), &merkle_root);
    let signature = proposer.sign(hash.as_bytes());
    Block {
        height,
        previous_hash,
        timestamp,
        transactions,
        proposer: proposer.public(),
        signature,
        hash,
        merkle_root,
    }
}

fn signed_tx(sender: &KeyPair, to: &PublicKey, amount: u64, fee: u64, nonce: u64, timestamp: u64) -> Transaction {
    let payload = Transaction::signing_payload(&sender.public(), to, amount, fee, nonce, timestamp);
    let signature = sender.sign(&payload);
    let mut tx = Transaction {
        hash: Hash::zero(),
        from: sender.public(),
        to: *to,
        amount,
        fee,
        nonce,
        timestamp,
        signature,
    };
    tx.hash = tx.compute_hash();
    tx
}

#[tokio::test]
async fn chain_continuity_holds_across_commits() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockchainStore::initialize(config(dir.path())).unwrap();
    let proposer = KeyPair::generate();

    let mut prev_hash = Hash::zero();
    for h in 0..5u64 {
        let block = mine_block(&proposer, h, prev_hash, 1_700_000_000 + h);
        prev_hash = block.hash;
        store.add_block(block, &proposer.public()).await.unwrap();
    }

    assert_eq!(store.get_height(), Some(4));
    for h in 1..5u64 {
        let block = store.get_block_by_height(h).unwrap();
        let parent = store.get_block_by_height(h - 1).unwrap();
        assert_eq!(block.previous_hash, parent.hash);
    }
}

#[tokio::test]
async fn duplicate_add_block_is_rejected_and_height_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockchainStore::initialize(config(dir.path())).unwrap();
    let proposer = KeyPair::generate();

    let block = mine_block(&proposer, 0, Hash::zero(), 1_700_000_000);
    store.add_block(block.clone(), &proposer.public()).await.unwrap();
    assert_eq!(store.get_height(), Some(0));

    let err = store.add_block(block, &proposer.public()).await.unwrap_err();
    assert!(matches!(err, ember_chain::StoreError::DuplicateBlock(0)));
    assert_eq!(store.get_height(), Some(0));
}

#[tokio::test]
async fn wrong_previous_hash_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockchainStore::initialize(config(dir.path())).unwrap();
    let proposer = KeyPair::generate();

    let genesis = mine_block(&proposer, 0, Hash::zero(), 1_700_000_000);
    store.add_block(genesis, &proposer.public()).await.unwrap();

    let bad = mine_block(&proposer, 1, Hash::zero(), 1_700_000_001);
    let err = store.add_block(bad, &proposer.public()).await.unwrap_err();
    assert!(matches!(err, ember_chain::StoreError::PrevHashMismatch { .. }));
}

#[tokio::test]
async fn checkpoint_recovery_rewinds_past_a_torn_write() {
    let dir = tempfile::tempdir().unwrap();
    let proposer = KeyPair::generate();

    {
        let store = BlockchainStore::initialize(config(dir.path())).unwrap();
        let mut prev_hash = Hash::zero();
        for h in 0..14u64 {
            let block = mine_block(&proposer, h, prev_hash, 1_700_000_000 + h);
            prev_hash = block.hash;
            store.add_block(block, &proposer.public()).await.unwrap();
        }
        assert_eq!(store.get_height(), Some(13));
    }

    // Simulate a crash mid-write of the 15th block (height 14): append
    // garbage bytes that look like the start of a length-prefixed record
    // but are never completed.
    let blocks_path = dir.path().join("blocks.dat");
    let mut bytes = std::fs::read(&blocks_path).unwrap();
    bytes.extend_from_slice(&(9999u32).to_le_bytes());
    bytes.extend_from_slice(b"not-a-full-record");
    std::fs::write(&blocks_path, bytes).unwrap();

    let index_path = dir.path().join("index.dat");
    let mut index_bytes = std::fs::read(&index_path).unwrap();
    // Append a matching (but now-invalid) index record pointing past the
    // valid blocks.dat tail, as if the index write raced ahead.
    let torn_offset = std::fs::metadata(&blocks_path).unwrap().len() - 21;
    index_bytes.extend_from_slice(&14u64.to_le_bytes());
    index_bytes.extend_from_slice(&torn_offset.to_le_bytes());
    index_bytes.extend_from_slice(&9999u32.to_le_bytes());
    index_bytes.extend_from_slice(&[0u8; 32]);
    std::fs::write(&index_path, index_bytes).unwrap();

    let recovered = BlockchainStore::initialize(config(dir.path())).unwrap();
    assert_eq!(recovered.get_height(), Some(13));
}

#[tokio::test]
async fn two_transactions_from_the_same_sender_cannot_jointly_overdraw_a_block() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockchainStore::initialize(config(dir.path())).unwrap();
    let sender = KeyPair::generate();
    let receiver = KeyPair::generate().public();

    // Genesis, proposed by `sender`, credits them the block reward (21).
    let genesis = mine_block(&sender, 0, Hash::zero(), 1_700_000_000);
    let genesis_hash = genesis.hash;
    store.add_block(genesis, &sender.public()).await.unwrap();
    assert_eq!(store.get_account(&sender.public()).unwrap().balance, 21);

    // Two transactions, each individually affordable against the starting
    // balance of 21, but together overdrawing it (15 + 15 = 30 > 21).
    let tx1 = signed_tx(&sender, &receiver, 15, 0, 1, 1_700_000_001);
    let tx2 = signed_tx(&sender, &receiver, 15, 0, 2, 1_700_000_001);
    let block = mine_block_with_txs(&sender, 1, genesis_hash, 1_700_000_001, vec![tx1, tx2]);

    let err = store.add_block(block, &sender.public()).await.unwrap_err();
    assert!(matches!(err, ember_chain::StoreError::InsufficientBalance { .. }));
    assert_eq!(store.get_height(), Some(0));
    assert_eq!(store.get_account(&sender.public()).unwrap().balance, 21);
}
