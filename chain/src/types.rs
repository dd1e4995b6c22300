use ember_crypto::sig::{PublicKey, Signature};
use ember_crypto::{Hash, H};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// §3 Data Model: Transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash,
    pub from: PublicKey,
    pub to: PublicKey,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub timestamp: u64,
    pub signature: Signature,
}

impl Transaction {
    /// The canonical encoding signed by `from` and hashed for `self.hash`.
    /// Field order is fixed (declaration order) so hashing is deterministic
    /// across processes, matching §3.1's canonical-encoding note.
    pub fn signing_payload(
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
        fee: u64,
        nonce: u64,
        timestamp: u64,
    ) -> Vec<u8> {
        #[derive(Serialize)]
        struct Payload<'a> {
            from: &'a PublicKey,
            to: &'a PublicKey,
            amount: u64,
            fee: u64,
            nonce: u64,
            timestamp: u64,
        }
        bincode::serialize(&Payload {
            from,
            to,
            amount,
            fee,
            nonce,
            timestamp,
        })
        .expect("Transaction payload always serializes")
    }

    pub fn compute_hash(&self) -> Hash {
        H::digest_one(&Self::signing_payload(
            &self.from,
            &self.to,
            self.amount,
            self.fee,
            self.nonce,
            self.timestamp,
        ))
    }

    /// §3 invariant: valid `SIG` over canonical encoding; amount/fee >= 0 is
    /// implied by the unsigned types.
    pub fn verify_signature(&self) -> bool {
        let payload = Self::signing_payload(
            &self.from,
            &self.to,
            self.amount,
            self.fee,
            self.nonce,
            self.timestamp,
        );
        ember_crypto::SIG::verify(&self.from, &payload, &self.signature).is_ok()
    }

    pub fn encoded_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }
}

/// §3 Data Model: Block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous_hash: Hash,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub proposer: PublicKey,
    pub signature: Signature,
    pub hash: Hash,
    pub merkle_root: Hash,
}

impl Block {
    /// `merkleRoot`: a simple paired-hash tree over transaction hashes. An
    /// empty block's root is `H` of nothing, keeping `compute_hash`
    /// well-defined for coinbase-only blocks.
    pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash {
        if transactions.is_empty() {
            return H::digest_one(b"empty-merkle-root");
        }
        let mut layer: Vec<Hash> = transactions.iter().map(|tx| tx.hash).collect();
        while layer.len() > 1 {
            let mut next = Vec::with_capacity((layer.len() + 1) / 2);
            for pair in layer.chunks(2) {
                let combined = if pair.len() == 2 {
                    H::digest(&[pair[0].as_bytes(), pair[1].as_bytes()])
                } else {
                    H::digest(&[pair[0].as_bytes(), pair[0].as_bytes()])
                };
                next.push(combined);
            }
            layer = next;
        }
        layer[0]
    }

    /// `hash = H(height ‖ previousHash ‖ timestamp ‖ proposer ‖ merkleRoot)`.
    pub fn compute_hash(
        height: u64,
        previous_hash: &Hash,
        timestamp: u64,
        proposer: &PublicKey,
        merkle_root: &Hash,
    ) -> Hash {
        H::digest(&[
            &height.to_be_bytes(),
            previous_hash.as_bytes(),
            &timestamp.to_be_bytes(),
            &bincode::serialize(proposer).expect("PublicKey always serializes"),
            merkle_root.as_bytes(),
        ])
    }

    pub fn encoded_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }

    /// Signing payload for the proposer's signature: everything but the
    /// signature itself.
    pub fn signing_payload(&self) -> Hash {
        Self::compute_hash(
            self.height,
            &self.previous_hash,
            self.timestamp,
            &self.proposer,
            &self.merkle_root,
        )
    }
}

/// §3 Data Model: Account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: PublicKey,
    pub balance: u64,
    pub nonce: u64,
    pub stake: u64,
    pub created_at: u64,
    pub last_updated: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },
    #[error("insufficient stake: have {have}, need {need}")]
    InsufficientStake { have: u64, need: u64 },
}

impl Account {
    pub fn new(address: PublicKey, now: u64) -> Self {
        Account {
            address,
            balance: 0,
            nonce: 0,
            stake: 0,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn debit(&mut self, amount: u64, now: u64) -> Result<(), AccountError> {
        if self.balance < amount {
            return Err(AccountError::InsufficientBalance {
                have: self.balance,
                need: amount,
            });
        }
        self.balance -= amount;
        self.last_updated = now;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64, now: u64) {
        self.balance += amount;
        self.last_updated = now;
    }

    /// Balance-conserving: moves `amount` out of `balance` into `stake`.
    pub fn add_stake(&mut self, amount: u64, now: u64) -> Result<(), AccountError> {
        self.debit(amount, now)?;
        self.stake += amount;
        Ok(())
    }

    /// Balance-conserving: moves `amount` out of `stake` back into `balance`.
    pub fn remove_stake(&mut self, amount: u64, now: u64) -> Result<(), AccountError> {
        if self.stake < amount {
            return Err(AccountError::InsufficientStake {
                have: self.stake,
                need: amount,
            });
        }
        self.stake -= amount;
        self.credit(amount, now);
        Ok(())
    }
}

/// §3 Data Model: Checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: Hash,
    pub created_at: u64,
    /// Digest over the index prefix up to `height`, used by recovery (§4.6)
    /// to pick the most recent checkpoint whose prefix is still valid.
    pub index_digest: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::KeyPair;

    fn signed_tx(kp: &KeyPair, to: &PublicKey, amount: u64, fee: u64, nonce: u64) -> Transaction {
        let timestamp = 1_700_000_000 + nonce;
        let payload = Transaction::signing_payload(&kp.public(), to, amount, fee, nonce, timestamp);
        let signature = kp.sign(&payload);
        let mut tx = Transaction {
            hash: Hash::zero(),
            from: kp.public(),
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

    #[test]
    fn transaction_signature_round_trips() {
        let from = KeyPair::generate();
        let to = KeyPair::generate().public();
        let tx = signed_tx(&from, &to, 10, 1, 1);
        assert!(tx.verify_signature());
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let from = KeyPair::generate();
        let to = KeyPair::generate().public();
        let mut tx = signed_tx(&from, &to, 10, 1, 1);
        tx.amount = 999;
        assert!(!tx.verify_signature());
    }

    #[test]
    fn merkle_root_is_deterministic() {
        let from = KeyPair::generate();
        let to = KeyPair::generate().public();
        let txs = vec![
            signed_tx(&from, &to, 1, 1, 1),
            signed_tx(&from, &to, 2, 1, 2),
            signed_tx(&from, &to, 3, 1, 3),
        ];
        let a = Block::compute_merkle_root(&txs);
        let b = Block::compute_merkle_root(&txs);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_block_merkle_root_is_well_defined() {
        let root = Block::compute_merkle_root(&[]);
        assert_eq!(root, Block::compute_merkle_root(&[]));
    }

    #[test]
    fn block_hash_is_deterministic_given_identical_inputs() {
        let proposer = KeyPair::generate().public();
        let prev = Hash::zero();
        let root = Block::compute_merkle_root(&[]);
        let a = Block::compute_hash(1, &prev, 1000, &proposer, &root);
        let b = Block::compute_hash(1, &prev, 1000, &proposer, &root);
        assert_eq!(a, b);
    }

    #[test]
    fn add_and_remove_stake_conserve_balance() {
        let kp = KeyPair::generate();
        let mut account = Account::new(kp.public(), 0);
        account.credit(100, 0);
        account.add_stake(40, 1).unwrap();
        assert_eq!(account.balance, 60);
        assert_eq!(account.stake, 40);
        account.remove_stake(40, 2).unwrap();
        assert_eq!(account.balance, 100);
        assert_eq!(account.stake, 0);
    }

    #[test]
    fn debit_beyond_balance_is_rejected() {
        let kp = KeyPair::generate();
        let mut account = Account::new(kp.public(), 0);
        account.credit(5, 0);
        assert!(account.debit(10, 1).is_err());
    }
}
