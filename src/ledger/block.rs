//! Block type: an ordered group of entries with a hash pointer to its
//! parent, secured by a trivial proof-of-work.

use serde::{Deserialize, Serialize};

use super::entry::LedgerEntry;
use crate::crypto::{self, MerkleTree};

/// The fields that go into a block's content hash. Hashing always goes
/// through one canonical struct, never ad hoc field lists.
#[derive(Serialize)]
struct HashedFields<'a> {
    index: u64,
    timestamp: u64,
    #[serde(rename = "merkleRoot")]
    merkle_root: &'a str,
    #[serde(rename = "previousHash")]
    previous_hash: &'a str,
    nonce: u64,
}

/// An ordered group of signed entries, hash-linked to its parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub entries: Vec<LedgerEntry>,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    #[serde(rename = "merkleRoot")]
    pub merkle_root: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Builds the genesis block: index 0, no entries, `previousHash = "0"`.
    pub fn genesis(timestamp: u64, difficulty: usize) -> Self {
        Block::mine(0, timestamp, Vec::new(), "0".to_string(), difficulty)
    }

    /// Builds and mines a new block on top of `previous_hash`.
    pub fn mine(
        index: u64,
        timestamp: u64,
        entries: Vec<LedgerEntry>,
        previous_hash: String,
        difficulty: usize,
    ) -> Self {
        let merkle_root = Self::merkle_root_for(&entries);
        let prefix = "0".repeat(difficulty);

        let mut nonce: u64 = 0;
        loop {
            let hash = Self::compute_hash_fields(index, timestamp, &merkle_root, &previous_hash, nonce);
            if hash.starts_with(&prefix) {
                return Block { index, timestamp, entries, previous_hash, merkle_root, nonce, hash };
            }
            nonce += 1;
        }
    }

    /// Computes the SHA3-256 Merkle root over the entries' content hashes.
    pub fn merkle_root_for(entries: &[LedgerEntry]) -> String {
        let leaves: Vec<String> = entries.iter().map(|e| e.hash.clone()).collect();
        MerkleTree::new(leaves).root()
    }

    fn compute_hash_fields(
        index: u64,
        timestamp: u64,
        merkle_root: &str,
        previous_hash: &str,
        nonce: u64,
    ) -> String {
        let fields = HashedFields { index, timestamp, merkle_root, previous_hash, nonce };
        crypto::hash_value(&fields)
    }

    /// Recomputes this block's hash from its other fields (does not re-mine).
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash_fields(self.index, self.timestamp, &self.merkle_root, &self.previous_hash, self.nonce)
    }

    /// Builds a Merkle tree over this block's entry hashes, for proofs.
    pub fn merkle_tree(&self) -> MerkleTree {
        let leaves: Vec<String> = self.entries.iter().map(|e| e.hash.clone()).collect();
        MerkleTree::new(leaves)
    }
}
