//! Audit engine: pure-read verification and independent re-tally over a
//! ledger and its registries. Nothing here mutates state.

use serde::Serialize;

use crate::error::GovError;
use crate::ledger::{EntryType, Ledger, LedgerStats};
use crate::voting::VotingManager;

#[derive(Debug, Serialize)]
pub struct ChainIntegrityReport {
    pub valid: bool,
    pub error: Option<String>,
    #[serde(rename = "blockIndex")]
    pub block_index: Option<u64>,
    pub stats: LedgerStats,
}

#[derive(Debug, Serialize)]
pub struct InclusionReport {
    pub found: bool,
    pub valid: bool,
    #[serde(rename = "blockIndex")]
    pub block_index: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SignatureReport {
    pub found: bool,
    #[serde(rename = "actorId")]
    pub actor_id: Option<String>,
    #[serde(rename = "signatureValid")]
    pub signature_valid: bool,
    pub note: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct EntrySummary {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(rename = "actorId")]
    pub actor_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct VoteVerification {
    pub matches: bool,
    pub recounted: RecountedTally,
}

#[derive(Debug, Serialize)]
pub struct RecountedTally {
    pub yea: u64,
    pub nay: u64,
    pub abstain: u64,
}

pub struct AuditEngine;

impl AuditEngine {
    /// Wraps [`Ledger::verify_chain`] with overall chain stats.
    pub fn verify_chain_integrity(ledger: &Ledger) -> ChainIntegrityReport {
        match ledger.verify_chain() {
            Ok(()) => ChainIntegrityReport { valid: true, error: None, block_index: None, stats: ledger.stats() },
            Err(GovError::Integrity { reason, block_index }) => {
                ChainIntegrityReport { valid: false, error: Some(reason), block_index, stats: ledger.stats() }
            }
            Err(other) => ChainIntegrityReport { valid: false, error: Some(other.to_string()), block_index: None, stats: ledger.stats() },
        }
    }

    /// Fetches an entry's inclusion proof and checks it against the owning
    /// block's stored Merkle root.
    pub fn verify_entry_inclusion(ledger: &Ledger, entry_id: &str) -> InclusionReport {
        let Some(entry) = ledger.get_entry(entry_id) else {
            return InclusionReport { found: false, valid: false, block_index: None };
        };
        let Some((block_index, proof)) = ledger.get_inclusion_proof(entry_id) else {
            return InclusionReport { found: true, valid: false, block_index: None };
        };
        let Some(block) = ledger.block_at(block_index) else {
            return InclusionReport { found: true, valid: false, block_index: Some(block_index) };
        };
        let valid = crate::crypto::MerkleTree::verify_proof(&entry.hash, &proof, &block.merkle_root);
        InclusionReport { found: true, valid, block_index: Some(block_index) }
    }

    /// Verifies an entry's signature against its owning identity's current
    /// public key. SYSTEM entries always report valid, documented as such.
    pub fn verify_entry_signature(ledger: &Ledger, entry_id: &str, pub_pem: Option<&str>) -> SignatureReport {
        let Some(entry) = ledger.get_entry(entry_id) else {
            return SignatureReport { found: false, actor_id: None, signature_valid: false, note: None };
        };
        if entry.actor_id == crate::ledger::SYSTEM_ACTOR {
            return SignatureReport {
                found: true,
                actor_id: Some(entry.actor_id.clone()),
                signature_valid: true,
                note: Some("SYSTEM entries are documentary and are not cryptographically signed"),
            };
        }
        let valid = entry.signature_is_valid(pub_pem);
        SignatureReport { found: true, actor_id: Some(entry.actor_id.clone()), signature_valid: valid, note: None }
    }

    /// All ledger entries authored by `fingerprint`, in chain order.
    pub fn get_identity_activity(ledger: &Ledger, fingerprint: &str) -> Vec<EntrySummary> {
        ledger
            .get_entries_by_actor(fingerprint)
            .into_iter()
            .map(|entry| EntrySummary {
                id: entry.id.clone(),
                entry_type: entry.entry_type.as_str().to_string(),
                actor_id: entry.actor_id.clone(),
                timestamp: entry.timestamp,
            })
            .collect()
    }

    /// All ledger entries whose payload references `proposal_id`, across the
    /// proposal/petition/voting entry types, in chain order.
    pub fn get_proposal_history(ledger: &Ledger, proposal_id: &str) -> Vec<EntrySummary> {
        const RELEVANT: [EntryType; 7] = [
            EntryType::ProposalCreate,
            EntryType::ProposalStateChange,
            EntryType::PetitionSign,
            EntryType::PetitionThresholdMet,
            EntryType::VoteCommit,
            EntryType::VoteReveal,
            EntryType::VoteTally,
        ];

        let mut summaries = Vec::new();
        for entry_type in RELEVANT {
            for entry in ledger.get_entries_by_type(entry_type) {
                let matches_proposal = entry
                    .payload
                    .get("proposalId")
                    .and_then(|v| v.as_str())
                    .map(|id| id == proposal_id)
                    .unwrap_or(false);
                if matches_proposal {
                    summaries.push(EntrySummary {
                        id: entry.id.clone(),
                        entry_type: entry.entry_type.as_str().to_string(),
                        actor_id: entry.actor_id.clone(),
                        timestamp: entry.timestamp,
                    });
                }
            }
        }
        summaries.sort_by_key(|s| s.timestamp);
        summaries
    }

    /// Independently re-counts `VOTE_REVEAL` entries for `proposal_id` and
    /// compares the result against the session's stored tally counts.
    pub fn verify_proposal_votes(ledger: &Ledger, voting: &VotingManager, proposal_id: &str) -> Result<VoteVerification, GovError> {
        let session = voting.session(proposal_id).ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?;
        let tally = session.tally_result.as_ref().ok_or_else(|| GovError::state("session has not been tallied"))?;

        let mut yea = 0u64;
        let mut nay = 0u64;
        let mut abstain = 0u64;
        for entry in ledger.get_entries_by_type(EntryType::VoteReveal) {
            let is_this_proposal =
                entry.payload.get("proposalId").and_then(|v| v.as_str()).map(|id| id == proposal_id).unwrap_or(false);
            if !is_this_proposal {
                continue;
            }
            match entry.payload.get("choice").and_then(|v| v.as_str()) {
                Some("YEA") => yea += 1,
                Some("NAY") => nay += 1,
                Some("ABSTAIN") => abstain += 1,
                _ => {}
            }
        }

        let recounted = RecountedTally { yea, nay, abstain };
        let matches = recounted.yea == tally.yea && recounted.nay == tally.nay && recounted.abstain == tally.abstain;
        Ok(VoteVerification { matches, recounted })
    }

    /// A full transparency snapshot: chain stats plus integrity status.
    pub fn generate_transparency_report(ledger: &Ledger) -> serde_json::Value {
        let integrity = Self::verify_chain_integrity(ledger);
        serde_json::json!({
            "integrity": integrity,
            "exportedAt": ledger.latest_block().timestamp,
        })
    }

    /// The full ledger, in its canonical wire form.
    pub fn export_ledger(ledger: &Ledger) -> serde_json::Value {
        ledger.to_json()
    }
}
