//! Governance ledger library crate.
//!
//! This crate provides the core building blocks for a decentralized,
//! publicly auditable governance ledger:
//!
//! - cryptographic primitives (`crypto`): hashing, signing, Merkle trees,
//!   commitments,
//! - the hash-linked chain of blocks and entries (`ledger`),
//! - an identity registry with challenge-response authentication
//!   (`identity`),
//! - a versioned proposal state machine (`proposal`),
//! - a thresholded petition manager (`petition`),
//! - a commit-reveal voting engine (`voting`),
//! - a pure-read audit surface (`audit`),
//! - peer-to-peer chain replication (`replication`),
//! - a pluggable ledger snapshot store (`storage`),
//! - and top-level node configuration (`config`).
//!
//! Higher-level binaries (HTTP gateways, CLIs, dashboards) can compose
//! these pieces; none of that surface lives in this crate.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod petition;
pub mod proposal;
pub mod replication;
pub mod storage;
pub mod voting;

// Re-export top-level configuration types.
pub use config::{GovChainConfig, IdentityConfig, LedgerConfig, ReplicationConfig, VotingDefaults};

// Re-export the shared error taxonomy.
pub use error::{GovError, StorageError};

// Re-export ledger types.
pub use ledger::{Block, EntryType, Ledger, LedgerEntry, LedgerStats, SYSTEM_ACTOR};

// Re-export the identity registry.
pub use identity::{Identity, IdentityRegistry, IdentityRegistryStats};

// Re-export the proposal state machine.
pub use proposal::{Proposal, ProposalRegistry, ProposalState, ProposalType, ProposalVersion, VotingConfig};

// Re-export the petition manager.
pub use petition::{Petition, PetitionManager, PetitionSignature, SignatureVerification};

// Re-export the voting engine.
pub use voting::{Ballot, Choice, TallyResult, VotePhase, VotingManager};

// Re-export the audit engine.
pub use audit::AuditEngine;

// Re-export replication.
pub use replication::{Message, ReplicationNode, DEFAULT_PORT};

// Re-export the pluggable snapshot store.
pub use storage::{InMemorySnapshotStore, LedgerSnapshotStore, RocksDbSnapshotStore};

use std::sync::Arc;

use tokio::sync::Mutex;

/// Shared node state: the ledger plus every registry composing over it.
///
/// Mirrors the layout an embedding HTTP gateway would use for its shared
/// state: one [`Mutex`] per concern rather than a single giant lock, so
/// independent subsystems (identity lookups, vote reveals, audits) do not
/// serialize against each other needlessly. Every registry is handed the
/// ledger mutex guard by the caller rather than owning it, keeping a
/// single logical owner per write path.
pub struct GovChain {
    pub ledger: Mutex<Ledger>,
    pub identities: Mutex<IdentityRegistry>,
    pub proposals: Mutex<ProposalRegistry>,
    pub petitions: Mutex<PetitionManager>,
    pub voting: Mutex<VotingManager>,
}

impl GovChain {
    pub fn new(genesis_timestamp: u64, config: &GovChainConfig) -> Self {
        GovChain {
            ledger: Mutex::new(Ledger::new(genesis_timestamp, config.ledger.difficulty)),
            identities: Mutex::new(IdentityRegistry::with_challenge_ttl(config.identity.challenge_ttl_seconds)),
            proposals: Mutex::new(ProposalRegistry::new()),
            petitions: Mutex::new(PetitionManager::new()),
            voting: Mutex::new(VotingManager::new()),
        }
    }
}

/// Thread-safe alias for [`GovChain`], for embedders that pass it across
/// tasks (an HTTP handler set, a replication node, a CLI command loop).
pub type SharedGovChain = Arc<GovChain>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_govchain_starts_with_a_fresh_genesis_block() {
        let chain = GovChain::new(0, &GovChainConfig::default());
        let ledger = chain.ledger.lock().await;
        assert_eq!(ledger.block_count(), 1);
        assert!(ledger.verify_chain().is_ok());
    }
}
