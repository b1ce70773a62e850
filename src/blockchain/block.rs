use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Index of the first block in every chain
pub const GENESIS_INDEX: u64 = 1;

/// Proof recorded in the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Placeholder stored as the genesis block's `previous_hash`; it is not a real hash
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain, starting at 1
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Proof of work for this block
    pub proof: u64,

    /// Hash of the previous block
    pub previous_hash: String,
}

/// Hashing view of a transaction. Field order is the encoding order and must stay sorted.
#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    action: &'a str,
    amount: f64,
    mac: &'a str,
    recipient: &'a str,
    sender: &'a str,
}

/// Hashing view of a block. Field order is the encoding order and must stay sorted.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    index: u64,
    previous_hash: &'a str,
    proof: u64,
    timestamp: &'a DateTime<Utc>,
    transactions: Vec<CanonicalTransaction<'a>>,
}

impl<'a> From<&'a Transaction> for CanonicalTransaction<'a> {
    fn from(tx: &'a Transaction) -> Self {
        CanonicalTransaction {
            action: &tx.action,
            amount: tx.amount,
            mac: &tx.mac,
            recipient: &tx.recipient,
            sender: &tx.sender,
        }
    }
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The list of transactions to include in the block
    /// * `proof` - The proof of work
    /// * `previous_hash` - The hash of the previous block
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Creates the genesis block (first block in the chain)
    pub fn genesis() -> Self {
        Block::new(
            GENESIS_INDEX,
            Vec::new(),
            GENESIS_PROOF,
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Deterministic byte encoding of every field of the block
    ///
    /// Compact JSON with keys in a fixed alphabetical order, so two blocks with the
    /// same field values encode identically however they were built.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = CanonicalBlock {
            index: self.index,
            previous_hash: &self.previous_hash,
            proof: self.proof,
            timestamp: &self.timestamp,
            transactions: self.transactions.iter().map(CanonicalTransaction::from).collect(),
        };

        // Plain structs without map keys cannot fail to serialize.
        serde_json::to_vec(&canonical).expect("canonical block encoding")
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the canonical encoding as a lowercase hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        hex::encode(hasher.finalize())
    }
}
