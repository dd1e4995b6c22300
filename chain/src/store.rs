use crate::error::StoreError;
use crate::reward::RewardSchedule;
use crate::types::{Account, Block, Checkpoint, Transaction};
use ember_crypto::sig::PublicKey;
use ember_crypto::{Hash, H};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

const LOG_TARGET: &str = "ember::chain::store";
const INDEX_RECORD_SIZE: usize = 8 + 8 + 4 + 32;
const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone)]
struct IndexEntry {
    height: u64,
    offset: u64,
    length: u32,
    hash: Hash,
}

struct ChainIndex {
    entries: Vec<IndexEntry>,
    by_hash: HashMap<Hash, u64>,
    tx_locations: HashMap<Hash, u64>,
}

impl ChainIndex {
    fn new() -> Self {
        ChainIndex {
            entries: Vec::new(),
            by_hash: HashMap::new(),
            tx_locations: HashMap::new(),
        }
    }

    fn height(&self) -> Option<u64> {
        self.entries.last().map(|e| e.height)
    }

    fn tip_hash(&self) -> Hash {
        self.entries.last().map(|e| e.hash).unwrap_or_else(Hash::zero)
    }
}

/// §4.6 BlockchainStore: persistent, append-only ledger with O(1) height
/// lookup, atomic commit and periodic checkpoints.
pub struct BlockchainStore {
    data_dir: PathBuf,
    block_size_limit: usize,
    reward_schedule: RewardSchedule,
    checkpoint_interval: u64,
    checkpoints_to_keep: usize,
    writer: Mutex<WriterState>,
    index: RwLock<ChainIndex>,
    accounts: RwLock<HashMap<PublicKey, Account>>,
    issued_supply: RwLock<f64>,
    events: broadcast::Sender<BlockAdded>,
}

struct WriterState {
    blocks_file: File,
    index_file: File,
}

#[derive(Debug, Clone)]
pub struct BlockAdded {
    pub height: u64,
    pub hash: Hash,
}

pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub block_size_limit: usize,
    pub reward_schedule: RewardSchedule,
    pub checkpoint_interval: u64,
    pub checkpoints_to_keep: usize,
}

impl BlockchainStore {
    /// Opens the data files and reconciles the index against the blocks
    /// log (§4.6 crash recovery), replaying committed transactions to
    /// rebuild in-memory account state.
    pub fn initialize(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| StoreError::Io {
            path: config.data_dir.clone(),
            source,
        })?;
        std::fs::create_dir_all(config.data_dir.join("checkpoints")).map_err(|source| StoreError::Io {
            path: config.data_dir.join("checkpoints"),
            source,
        })?;

        let blocks_path = config.data_dir.join("blocks.dat");
        let index_path = config.data_dir.join("index.dat");

        let mut blocks_file = open_rw(&blocks_path)?;
        let mut index_file = open_rw(&index_path)?;

        let raw_index = read_all(&mut index_file, &index_path)?;
        let blocks_len = blocks_file
            .metadata()
            .map_err(|source| StoreError::Io {
                path: blocks_path.clone(),
                source,
            })?
            .len();

        let (entries, valid_index_bytes) = reconcile_index(&raw_index, blocks_len);
        if valid_index_bytes < raw_index.len() {
            warn!(target: LOG_TARGET, dropped_bytes = raw_index.len() - valid_index_bytes, "truncating corrupted index tail");
            index_file
                .set_len(valid_index_bytes as u64)
                .map_err(|source| StoreError::Io {
                    path: index_path.clone(),
                    source,
                })?;
        }
        let valid_blocks_len = entries
            .last()
            .map(|e| e.offset + LENGTH_PREFIX_SIZE as u64 + e.length as u64)
            .unwrap_or(0);
        if valid_blocks_len < blocks_len {
            warn!(target: LOG_TARGET, dropped_bytes = blocks_len - valid_blocks_len, "truncating partial trailing block record");
            blocks_file
                .set_len(valid_blocks_len)
                .map_err(|source| StoreError::Io {
                    path: blocks_path.clone(),
                    source,
                })?;
        }

        let mut index = ChainIndex::new();
        let mut accounts: HashMap<PublicKey, Account> = HashMap::new();
        let mut issued_supply = 0f64;

        for entry in &entries {
            let block = read_block_at(&mut blocks_file, entry.offset, entry.length)?;
            for tx in &block.transactions {
                index.tx_locations.insert(tx.hash, entry.height);
            }
            apply_block_to_accounts(&mut accounts, &block, &config.reward_schedule, &mut issued_supply).map_err(|e| {
                StoreError::CorruptedLog(format!(
                    "replaying committed block {} violated the balance-conservation invariant: {e}",
                    entry.height
                ))
            })?;
            index.by_hash.insert(entry.hash, entry.height);
            index.entries.push(entry.clone());
        }

        blocks_file
            .seek(SeekFrom::End(0))
            .map_err(|source| StoreError::Io { path: blocks_path.clone(), source })?;
        index_file
            .seek(SeekFrom::End(0))
            .map_err(|source| StoreError::Io { path: index_path.clone(), source })?;

        info!(target: LOG_TARGET, height = ?index.height(), "blockchain store initialized");

        let (tx, _rx) = broadcast::channel(256);
        Ok(BlockchainStore {
            data_dir: config.data_dir,
            block_size_limit: config.block_size_limit,
            reward_schedule: config.reward_schedule,
            checkpoint_interval: config.checkpoint_interval,
            checkpoints_to_keep: config.checkpoints_to_keep,
            writer: Mutex::new(WriterState { blocks_file, index_file }),
            index: RwLock::new(index),
            accounts: RwLock::new(accounts),
            issued_supply: RwLock::new(issued_supply),
            events: tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockAdded> {
        self.events.subscribe()
    }

    pub fn get_height(&self) -> Option<u64> {
        self.index.read().unwrap().height()
    }

    pub fn tip_hash(&self) -> Hash {
        self.index.read().unwrap().tip_hash()
    }

    pub fn get_account(&self, address: &PublicKey) -> Option<Account> {
        self.accounts.read().unwrap().get(address).cloned()
    }

    pub fn last_committed_nonce(&self, address: &PublicKey) -> u64 {
        self.accounts
            .read()
            .unwrap()
            .get(address)
            .map(|a| a.nonce)
            .unwrap_or(0)
    }

    pub fn issued_supply(&self) -> f64 {
        *self.issued_supply.read().unwrap()
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Block, StoreError> {
        let entry = {
            let idx = self.index.read().unwrap();
            idx.entries
                .iter()
                .find(|e| e.height == height)
                .cloned()
                .ok_or(StoreError::NotFound(height))?
        };
        let mut f = File::open(self.data_dir.join("blocks.dat")).map_err(|source| StoreError::Io {
            path: self.data_dir.join("blocks.dat"),
            source,
        })?;
        read_block_at(&mut f, entry.offset, entry.length)
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, StoreError> {
        let height = *self
            .index
            .read()
            .unwrap()
            .by_hash
            .get(hash)
            .ok_or_else(|| StoreError::NotFound(0))?;
        self.get_block_by_height(height)
    }

    pub fn get_transaction_by_hash(&self, hash: &Hash) -> Result<Transaction, StoreError> {
        let height = *self
            .index
            .read()
            .unwrap()
            .tx_locations
            .get(hash)
            .ok_or_else(|| StoreError::NotFound(0))?;
        let block = self.get_block_by_height(height)?;
        block
            .transactions
            .into_iter()
            .find(|tx| tx.hash == *hash)
            .ok_or_else(|| StoreError::NotFound(height))
    }

    /// §4.6 `addBlock`: append iff height/prevHash/signature/tx-validity all
    /// hold; applies the fee-conserving state transition and the block
    /// reward, then fsyncs block bytes before the index entry (§4.6 storage
    /// layout: "write block bytes, fsync, then append index entry, fsync").
    pub async fn add_block(&self, block: Block, proposer: &PublicKey) -> Result<(), StoreError> {
        let current_height = self.get_height();
        let expected_height = current_height.map(|h| h + 1).unwrap_or(0);
        if block.height != expected_height {
            if current_height.map_or(false, |h| block.height <= h) {
                return Err(StoreError::DuplicateBlock(block.height));
            }
            return Err(StoreError::HeightMismatch {
                expected: expected_height,
                got: block.height,
            });
        }
        let tip = self.tip_hash();
        if block.previous_hash != tip {
            return Err(StoreError::PrevHashMismatch {
                declared: block.previous_hash.to_hex(),
                tip: tip.to_hex(),
            });
        }
        let size = block.encoded_size();
        if size > self.block_size_limit {
            return Err(StoreError::BlockTooLarge {
                actual: size,
                limit: self.block_size_limit,
            });
        }
        if block.hash != block.signing_payload() {
            return Err(StoreError::SignatureInvalid);
        }
        ember_crypto::SIG::verify(proposer, block.hash.as_bytes(), &block.signature)
            .map_err(|_| StoreError::SignatureInvalid)?;

        self.validate_transactions(&block)?;

        let encoded = bincode::serialize(&block)?;
        let mut writer = self.writer.lock().await;
        let offset = writer
            .blocks_file
            .seek(SeekFrom::End(0))
            .map_err(|source| StoreError::Io {
                path: self.data_dir.join("blocks.dat"),
                source,
            })?;
        writer
            .blocks_file
            .write_all(&(encoded.len() as u32).to_le_bytes())
            .and_then(|_| writer.blocks_file.write_all(&encoded))
            .and_then(|_| writer.blocks_file.sync_data())
            .map_err(|source| StoreError::Io {
                path: self.data_dir.join("blocks.dat"),
                source,
            })?;

        let mut record = Vec::with_capacity(INDEX_RECORD_SIZE);
        record.extend_from_slice(&block.height.to_le_bytes());
        record.extend_from_slice(&offset.to_le_bytes());
        record.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        record.extend_from_slice(block.hash.as_bytes());
        writer
            .index_file
            .write_all(&record)
            .and_then(|_| writer.index_file.sync_data())
            .map_err(|source| StoreError::Io {
                path: self.data_dir.join("index.dat"),
                source,
            })?;
        drop(writer);

        {
            let mut idx = self.index.write().unwrap();
            for tx in &block.transactions {
                idx.tx_locations.insert(tx.hash, block.height);
            }
            idx.by_hash.insert(block.hash, block.height);
            idx.entries.push(IndexEntry {
                height: block.height,
                offset,
                length: encoded.len() as u32,
                hash: block.hash,
            });
        }
        {
            let mut accounts = self.accounts.write().unwrap();
            let mut issued = self.issued_supply.write().unwrap();
            apply_block_to_accounts(&mut accounts, &block, &self.reward_schedule, &mut issued)?;
        }

        info!(target: LOG_TARGET, height = block.height, hash = %block.hash, "block committed");
        let _ = self.events.send(BlockAdded {
            height: block.height,
            hash: block.hash,
        });

        if block.height != 0 && block.height % self.checkpoint_interval == 0 {
            if let Err(e) = self.write_checkpoint(block.height) {
                warn!(target: LOG_TARGET, error = %e, "failed to write checkpoint");
            }
        }
        Ok(())
    }

    fn validate_transactions(&self, block: &Block) -> Result<(), StoreError> {
        let accounts = self.accounts.read().unwrap();
        let mut seen_nonces: HashMap<PublicKey, u64> = HashMap::new();
        // Per-sender cumulative spend already committed to *within this block*,
        // so two transactions from the same sender can't each validate against
        // the same starting balance and together overdraw the account.
        let mut seen_debits: HashMap<PublicKey, u64> = HashMap::new();
        for tx in &block.transactions {
            if !tx.verify_signature() {
                return Err(StoreError::SignatureInvalid);
            }
            let last_committed = accounts.get(&tx.from).map(|a| a.nonce).unwrap_or(0);
            let floor = *seen_nonces.get(&tx.from).unwrap_or(&last_committed);
            if tx.nonce != floor + 1 {
                return Err(StoreError::InvalidNonce {
                    expected: floor + 1,
                    got: tx.nonce,
                });
            }
            seen_nonces.insert(tx.from, tx.nonce);

            let spend = tx.amount.saturating_add(tx.fee);
            let already_spent = *seen_debits.get(&tx.from).unwrap_or(&0);
            let balance = accounts.get(&tx.from).map(|a| a.balance).unwrap_or(0);
            let available = balance.saturating_sub(already_spent);
            if available < spend {
                return Err(StoreError::InsufficientBalance {
                    have: available,
                    need: spend,
                });
            }
            seen_debits.insert(tx.from, already_spent + spend);
        }
        Ok(())
    }

    fn write_checkpoint(&self, height: u64) -> Result<(), StoreError> {
        let idx = self.index.read().unwrap();
        let prefix_hashes: Vec<Hash> = idx
            .entries
            .iter()
            .filter(|e| e.height <= height)
            .map(|e| e.hash)
            .collect();
        let hash = idx
            .entries
            .iter()
            .find(|e| e.height == height)
            .map(|e| e.hash)
            .unwrap_or_else(Hash::zero);
        drop(idx);

        let digest_input: Vec<u8> = prefix_hashes.iter().flat_map(|h| *h.as_bytes()).collect();
        let checkpoint = Checkpoint {
            height,
            hash,
            created_at: now_unix(),
            index_digest: H::digest_one(&digest_input),
        };
        let path = self
            .data_dir
            .join("checkpoints")
            .join(format!("checkpoint-{height:020}.bin"));
        let encoded = bincode::serialize(&checkpoint)?;
        std::fs::write(&path, encoded).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        self.prune_checkpoints()?;
        Ok(())
    }

    fn prune_checkpoints(&self) -> Result<(), StoreError> {
        let dir = self.data_dir.join("checkpoints");
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|source| StoreError::Io { path: dir.clone(), source })?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        files.sort();
        while files.len() > self.checkpoints_to_keep {
            let oldest = files.remove(0);
            let _ = std::fs::remove_file(oldest);
        }
        Ok(())
    }

    pub fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let dir = self.data_dir.join("checkpoints");
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|source| StoreError::Io { path: dir.clone(), source })? {
            let path = entry.map_err(|source| StoreError::Io { path: dir.clone(), source })?.path();
            let bytes = std::fs::read(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
            out.push(bincode::deserialize(&bytes)?);
        }
        out.sort_by_key(|c: &Checkpoint| c.height);
        Ok(out)
    }
}

fn open_rw(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn read_all(file: &mut File, path: &Path) -> Result<Vec<u8>, StoreError> {
    file.seek(SeekFrom::Start(0)).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(buf)
}

/// Parses as many whole index records as possible and additionally drops the
/// last record if its referenced block bytes don't fully fit within
/// `blocks_len` (a torn write across both files).
fn reconcile_index(raw: &[u8], blocks_len: u64) -> (Vec<IndexEntry>, usize) {
    let whole_records = raw.len() / INDEX_RECORD_SIZE;
    let mut entries = Vec::with_capacity(whole_records);
    for i in 0..whole_records {
        let rec = &raw[i * INDEX_RECORD_SIZE..(i + 1) * INDEX_RECORD_SIZE];
        let height = u64::from_le_bytes(rec[0..8].try_into().unwrap());
        let offset = u64::from_le_bytes(rec[8..16].try_into().unwrap());
        let length = u32::from_le_bytes(rec[16..20].try_into().unwrap());
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&rec[20..52]);
        entries.push(IndexEntry {
            height,
            offset,
            length,
            hash: Hash(hash),
        });
    }
    while let Some(last) = entries.last() {
        if last.offset + LENGTH_PREFIX_SIZE as u64 + last.length as u64 > blocks_len {
            entries.pop();
        } else {
            break;
        }
    }
    (entries, entries.len() * INDEX_RECORD_SIZE)
}

fn read_block_at(file: &mut File, offset: u64, length: u32) -> Result<Block, StoreError> {
    file.seek(SeekFrom::Start(offset)).map_err(|source| StoreError::Io {
        path: PathBuf::from("blocks.dat"),
        source,
    })?;
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    file.read_exact(&mut len_buf).map_err(|source| StoreError::Io {
        path: PathBuf::from("blocks.dat"),
        source,
    })?;
    let declared_len = u32::from_le_bytes(len_buf);
    if declared_len != length {
        return Err(StoreError::CorruptedLog(format!(
            "length prefix {declared_len} does not match index length {length}"
        )));
    }
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf).map_err(|source| StoreError::Io {
        path: PathBuf::from("blocks.dat"),
        source,
    })?;
    Ok(bincode::deserialize(&buf)?)
}

fn apply_block_to_accounts(
    accounts: &mut HashMap<PublicKey, Account>,
    block: &Block,
    reward_schedule: &RewardSchedule,
    issued_supply: &mut f64,
) -> Result<(), StoreError> {
    let now = block.timestamp;
    let mut fees = 0u64;
    for tx in &block.transactions {
        let sender = accounts.entry(tx.from).or_insert_with(|| Account::new(tx.from, now));
        sender.debit(tx.amount.saturating_add(tx.fee), now)?;
        fees += tx.fee;
        let receiver = accounts.entry(tx.to).or_insert_with(|| Account::new(tx.to, now));
        receiver.credit(tx.amount, now);
    }
    for tx in &block.transactions {
        if let Some(acc) = accounts.get_mut(&tx.from) {
            acc.nonce = acc.nonce.max(tx.nonce);
        }
    }
    let reward = reward_schedule.reward_respecting_cap(block.height, *issued_supply);
    *issued_supply += reward;
    let proposer = accounts
        .entry(block.proposer)
        .or_insert_with(|| Account::new(block.proposer, now));
    proposer.credit(reward as u64 + fees, now);
    Ok(())
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
