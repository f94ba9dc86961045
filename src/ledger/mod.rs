//! The hash-linked chain: entries are buffered, then sealed into mined
//! blocks, with indexes kept for O(1) lookup by entry id, type, and actor.

mod block;
mod entry;

pub use block::Block;
pub use entry::{EntryType, LedgerEntry, SYSTEM_ACTOR};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::ProofStep;
use crate::error::GovError;

/// Coarse health snapshot, returned by [`Ledger::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    #[serde(rename = "blockCount")]
    pub block_count: u64,
    #[serde(rename = "entryCount")]
    pub entry_count: u64,
    #[serde(rename = "pendingCount")]
    pub pending_count: u64,
    pub difficulty: usize,
}

/// Where an entry lives once sealed into a block.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct EntryLocation {
    #[serde(rename = "blockIndex")]
    block_index: u64,
    position: usize,
}

/// The append-only, hash-linked governance ledger.
///
/// Entries are buffered in [`Ledger::add_entry`] and only become part of the
/// hash chain once [`Ledger::commit_block`] mines and seals them; nothing in
/// `pending` is covered by a block hash or Merkle root until then.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(rename = "chain")]
    blocks: Vec<Block>,
    pending: Vec<LedgerEntry>,
    difficulty: usize,

    #[serde(skip)]
    entry_index: HashMap<String, EntryLocation>,
    #[serde(skip)]
    type_index: HashMap<&'static str, Vec<String>>,
    #[serde(skip)]
    actor_index: HashMap<String, Vec<String>>,
}

impl Ledger {
    /// Creates a new ledger with a freshly mined genesis block.
    pub fn new(genesis_timestamp: u64, difficulty: usize) -> Self {
        let genesis = Block::genesis(genesis_timestamp, difficulty);
        let mut ledger = Ledger {
            blocks: vec![genesis],
            pending: Vec::new(),
            difficulty,
            entry_index: HashMap::new(),
            type_index: HashMap::new(),
            actor_index: HashMap::new(),
        };
        ledger.rebuild_indexes();
        ledger
    }

    /// Buffers a new entry for inclusion in the next mined block.
    pub fn add_entry(&mut self, entry: LedgerEntry) {
        self.pending.push(entry);
    }

    /// Seals all currently pending entries into a new mined block.
    ///
    /// Returns an error if there is nothing pending; callers that want an
    /// always-advancing chain should check [`Ledger::pending_count`] first.
    pub fn commit_block(&mut self, timestamp: u64) -> Result<&Block, GovError> {
        if self.pending.is_empty() {
            return Err(GovError::state("no pending entries to commit"));
        }
        let entries = std::mem::take(&mut self.pending);
        let previous_hash = self.latest_block().hash.clone();
        let index = self.blocks.len() as u64;

        let block = Block::mine(index, timestamp, entries, previous_hash, self.difficulty);
        self.blocks.push(block);
        self.index_block(self.blocks.len() - 1);

        Ok(self.blocks.last().expect("just pushed"))
    }

    /// The most recently committed block (always at least genesis).
    pub fn latest_block(&self) -> &Block {
        self.blocks.last().expect("ledger always has a genesis block")
    }

    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    /// Full structural verification: every block's
    /// `previousHash` must match its predecessor's hash, every block's hash
    /// must be reproducible from its own fields, every entry's hash must be
    /// reproducible, and every block's Merkle root must match its entries.
    /// Stops at the first failing block and reports its index.
    pub fn verify_chain(&self) -> Result<(), GovError> {
        for (i, block) in self.blocks.iter().enumerate() {
            if i == 0 {
                if block.previous_hash != "0" {
                    return Err(GovError::integrity("genesis block has a non-zero previous hash", Some(0)));
                }
            } else {
                let prev = &self.blocks[i - 1];
                if block.previous_hash != prev.hash {
                    return Err(GovError::integrity(
                        "previous hash does not match predecessor",
                        Some(i as u64),
                    ));
                }
            }

            if block.hash != block.recompute_hash() {
                return Err(GovError::integrity("block hash does not match its contents", Some(i as u64)));
            }

            for entry in &block.entries {
                if !entry.hash_is_valid() {
                    return Err(GovError::integrity(
                        format!("entry {} hash does not match its contents", entry.id),
                        Some(i as u64),
                    ));
                }
            }

            if block.merkle_root != Block::merkle_root_for(&block.entries) {
                return Err(GovError::integrity("merkle root does not match entries", Some(i as u64)));
            }
        }
        Ok(())
    }

    pub fn get_entry(&self, id: &str) -> Option<&LedgerEntry> {
        let loc = self.entry_index.get(id)?;
        self.blocks.get(loc.block_index as usize)?.entries.get(loc.position)
    }

    pub fn get_entries_by_type(&self, entry_type: EntryType) -> Vec<&LedgerEntry> {
        self.type_index
            .get(entry_type.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.get_entry(id))
            .collect()
    }

    pub fn get_entries_by_actor(&self, actor_id: &str) -> Vec<&LedgerEntry> {
        self.actor_index
            .get(actor_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get_entry(id))
            .collect()
    }

    /// Builds a Merkle inclusion proof for a committed entry, returning the
    /// owning block's index alongside the proof steps.
    pub fn get_inclusion_proof(&self, id: &str) -> Option<(u64, Vec<ProofStep>)> {
        let loc = self.entry_index.get(id)?;
        let block = self.blocks.get(loc.block_index as usize)?;
        let tree = block.merkle_tree();
        let proof = tree.proof(loc.position)?;
        Some((loc.block_index, proof))
    }

    pub fn stats(&self) -> LedgerStats {
        let entry_count = self.blocks.iter().map(|b| b.entries.len() as u64).sum();
        LedgerStats {
            block_count: self.block_count(),
            entry_count,
            pending_count: self.pending_count(),
            difficulty: self.difficulty,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ledger is always serializable")
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, GovError> {
        let mut ledger: Ledger =
            serde_json::from_value(value).map_err(|e| GovError::validation(format!("malformed ledger: {e}")))?;
        ledger.rebuild_indexes();
        Ok(ledger)
    }

    /// Appends a block received via gossip directly onto the chain,
    /// updating indexes the same way [`Ledger::commit_block`] does. Callers
    /// must have already checked `previousHash` linkage (and, in hardened
    /// deployments, re-verified the block's own hashes) before calling
    /// this; local `pending` is left untouched.
    pub fn adopt_block(&mut self, block: Block) {
        self.blocks.push(block);
        self.index_block(self.blocks.len() - 1);
    }

    /// Replaces this ledger's blocks wholesale, used by replication when a
    /// peer presents a strictly longer valid chain. Callers must have
    /// already run [`Ledger::verify_chain`]-equivalent checks on the
    /// candidate before calling this.
    pub fn adopt_chain(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
        self.pending.clear();
        self.rebuild_indexes();
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    fn rebuild_indexes(&mut self) {
        self.entry_index.clear();
        self.type_index.clear();
        self.actor_index.clear();
        for i in 0..self.blocks.len() {
            self.index_block(i);
        }
    }

    fn index_block(&mut self, block_index: usize) {
        let block = &self.blocks[block_index];
        for (position, entry) in block.entries.iter().enumerate() {
            let loc = EntryLocation { block_index: block_index as u64, position };
            self.entry_index.insert(entry.id.clone(), loc);
            self.type_index.entry(entry.entry_type.as_str()).or_default().push(entry.id.clone());
            self.actor_index.entry(entry.actor_id.clone()).or_default().push(entry.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_entry(actor_id: &str, ty: EntryType) -> LedgerEntry {
        LedgerEntry::new_system(ty, serde_json::json!({"actor": actor_id}), 1_700_000_000)
    }

    #[test]
    fn fresh_ledger_has_only_genesis_and_passes_verification() {
        let ledger = Ledger::new(0, 1);
        assert_eq!(ledger.block_count(), 1);
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn committing_pending_entries_advances_the_chain_and_indexes_them() {
        let mut ledger = Ledger::new(0, 1);
        let entry = dummy_entry("alice", EntryType::Register);
        let id = entry.id.clone();
        ledger.add_entry(entry);
        assert_eq!(ledger.pending_count(), 1);

        ledger.commit_block(1).unwrap();
        assert_eq!(ledger.block_count(), 2);
        assert_eq!(ledger.pending_count(), 0);
        assert!(ledger.get_entry(&id).is_some());
        assert_eq!(ledger.get_entries_by_type(EntryType::Register).len(), 1);
        assert_eq!(ledger.get_entries_by_actor("SYSTEM").len(), 1);
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn committing_with_nothing_pending_is_an_error() {
        let mut ledger = Ledger::new(0, 1);
        assert!(ledger.commit_block(1).is_err());
    }

    #[test]
    fn inclusion_proof_verifies_against_the_block_hash() {
        let mut ledger = Ledger::new(0, 1);
        ledger.add_entry(dummy_entry("alice", EntryType::Register));
        ledger.add_entry(dummy_entry("bob", EntryType::Register));
        ledger.commit_block(1).unwrap();

        let entries = ledger.get_entries_by_type(EntryType::Register);
        let target = entries[0];
        let id = target.id.clone();
        let leaf_hash = target.hash.clone();

        let (block_index, proof) = ledger.get_inclusion_proof(&id).unwrap();
        let block = ledger.block_at(block_index).unwrap();
        assert!(crate::crypto::MerkleTree::verify_proof(&leaf_hash, &proof, &block.merkle_root));
    }

    #[test]
    fn tampering_with_a_committed_entry_fails_chain_verification() {
        let mut ledger = Ledger::new(0, 1);
        ledger.add_entry(dummy_entry("alice", EntryType::Register));
        ledger.commit_block(1).unwrap();

        let value = ledger.to_json();
        let mut ledger = Ledger::from_json(value).unwrap();
        let block = &mut ledger.blocks[1];
        block.entries[0].payload = serde_json::json!({"actor": "mallory"});

        let err = ledger.verify_chain().unwrap_err();
        match err {
            GovError::Integrity { block_index: Some(1), .. } => {}
            other => panic!("expected integrity error at block 1, got {other}"),
        }
    }

    #[test]
    fn json_round_trip_rebuilds_indexes() {
        let mut ledger = Ledger::new(0, 1);
        ledger.add_entry(dummy_entry("alice", EntryType::Register));
        ledger.commit_block(1).unwrap();

        let value = ledger.to_json();
        let restored = Ledger::from_json(value).unwrap();
        assert_eq!(restored.block_count(), 2);
        assert_eq!(restored.get_entries_by_actor("SYSTEM").len(), 1);
        assert!(restored.verify_chain().is_ok());
    }

    #[test]
    fn adopting_a_longer_chain_replaces_blocks_and_clears_pending() {
        let mut ledger = Ledger::new(0, 1);
        ledger.add_entry(dummy_entry("alice", EntryType::Register));

        let mut donor = Ledger::new(0, 1);
        donor.add_entry(dummy_entry("bob", EntryType::Attestation));
        donor.commit_block(1).unwrap();

        ledger.adopt_chain(donor.blocks().to_vec());
        assert_eq!(ledger.block_count(), 2);
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.get_entries_by_type(EntryType::Attestation).len(), 1);
    }
}
