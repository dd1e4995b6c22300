use ember_chain::Transaction;
use ember_crypto::sig::PublicKey;
use ember_crypto::{Hash, PeerID};
use serde::{Deserialize, Serialize};

/// `GET_BLOCKS` payload: an inclusive height range, capped by the responder
/// to whatever it actually has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRangeRequest {
    pub from_height: u64,
    pub to_height: u64,
}

/// `GET_TRANSACTIONS` payload: the set of hashes the requester is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsRequest {
    pub hashes: Vec<Hash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

/// `VALIDATOR_UPDATE` payload: the wire encoding of the two validator
/// lifecycle events the rest of the network needs to learn about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidatorUpdateWire {
    Registered { address: PublicKey, stake: u64, moniker: String },
    Activated { address: PublicKey },
}

/// `RELAY_ENVELOPE` payload (§4.4): a frame `src` couldn't deliver to `dst`
/// directly, carried hop by hop until it reaches `dst` or a node that can
/// store it for later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelopeWire {
    pub id: u64,
    pub src: PeerID,
    pub dst: PeerID,
    pub payload: Vec<u8>,
    pub encrypted: bool,
    pub ttl: u8,
}
