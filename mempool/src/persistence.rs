use ember_chain::Transaction;
use ember_crypto::Hash;
use redis::AsyncCommands;
use tracing::warn;

const LOG_TARGET: &str = "ember::mempool::persistence";

fn tx_key(hash: &Hash) -> String {
    format!("mempool:tx:{}", hash.to_hex())
}

const NONCES_KEY: &str = "mempool:nonces";

/// §4.5 Persistence: a Redis-compatible KV mirror of the pool, so a restart
/// can reload pending transactions without waiting on the network. The pool
/// itself always holds the authoritative in-memory state; KV failures are
/// logged and otherwise swallowed, never surfaced to callers submitting
/// transactions.
pub struct MempoolPersistence {
    client: Option<redis::Client>,
}

impl MempoolPersistence {
    pub fn connect(url: &str) -> Self {
        match redis::Client::open(url) {
            Ok(client) => MempoolPersistence { client: Some(client) },
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "could not open redis client, persistence disabled");
                MempoolPersistence { client: None }
            }
        }
    }

    pub fn disabled() -> Self {
        MempoolPersistence { client: None }
    }

    /// §4.5 "every `persistenceInterval`, snapshot pool to an external KV":
    /// overwrites the KV mirror with exactly the pool's current contents —
    /// deletes keys for anything no longer pending, (re)writes everything
    /// that still is. Called periodically by the Integrator's maintenance
    /// loop, not per `submit`/`removeCommitted` call.
    pub async fn replace_all(&self, txs: &[Transaction]) {
        let Some(client) = &self.client else { return };
        let result: redis::RedisResult<()> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let keep: std::collections::HashSet<String> = txs.iter().map(|tx| tx_key(&tx.hash)).collect();
            let existing_keys: Vec<String> = conn.keys("mempool:tx:*").await?;
            for key in existing_keys {
                if !keep.contains(&key) {
                    conn.del(&key).await?;
                }
            }
            conn.del(NONCES_KEY).await?;
            for tx in txs {
                let bytes = bincode::serialize(tx).expect("Transaction always serializes");
                conn.set(tx_key(&tx.hash), bytes).await?;
                conn.hset(NONCES_KEY, tx.from.to_hex(), tx.nonce).await?;
            }
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(target: LOG_TARGET, %err, "failed to snapshot mempool to kv store");
        }
    }

    /// Restores every `mempool:tx:<hash>` entry on startup. Nonce
    /// continuity is re-validated by the pool itself as each transaction is
    /// re-added, so a partially-written snapshot self-heals rather than
    /// wedging the pool.
    pub async fn load_all(&self) -> Vec<Transaction> {
        let Some(client) = &self.client else { return Vec::new() };
        let result: redis::RedisResult<Vec<Transaction>> = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let keys: Vec<String> = conn.keys("mempool:tx:*").await?;
            let mut txs = Vec::with_capacity(keys.len());
            for key in keys {
                let bytes: Vec<u8> = conn.get(&key).await?;
                match bincode::deserialize::<Transaction>(&bytes) {
                    Ok(tx) => txs.push(tx),
                    Err(err) => warn!(target: LOG_TARGET, %err, %key, "dropping corrupt mempool snapshot entry"),
                }
            }
            Ok(txs)
        }
        .await;
        match result {
            Ok(txs) => txs,
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "failed to load mempool snapshot, starting empty");
                Vec::new()
            }
        }
    }
}
