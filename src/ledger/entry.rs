//! Ledger entries: the atomic signed action appended to blocks.

use serde::{Deserialize, Serialize};

use crate::crypto;

/// Actor identifier literal used by entries the ledger itself emits
/// (threshold-met notices, tally results) rather than a participant.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Registered ledger entry type discriminators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Register,
    Attestation,
    RevokeIdentity,
    ProposalCreate,
    ProposalStateChange,
    PetitionSign,
    PetitionThresholdMet,
    VoteCommit,
    VoteReveal,
    VoteTally,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Register => "REGISTER",
            EntryType::Attestation => "ATTESTATION",
            EntryType::RevokeIdentity => "REVOKE_IDENTITY",
            EntryType::ProposalCreate => "PROPOSAL_CREATE",
            EntryType::ProposalStateChange => "PROPOSAL_STATE_CHANGE",
            EntryType::PetitionSign => "PETITION_SIGN",
            EntryType::PetitionThresholdMet => "PETITION_THRESHOLD_MET",
            EntryType::VoteCommit => "VOTE_COMMIT",
            EntryType::VoteReveal => "VOTE_REVEAL",
            EntryType::VoteTally => "VOTE_TALLY",
        }
    }
}

/// The fields of a [`LedgerEntry`] that go into its content hash and, for
/// actor-signed entries, its signature. Kept as a standalone struct so the
/// "what gets hashed/signed" contract is exactly one type, not a field list
/// duplicated at every call site.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SignedFields<'a> {
    #[serde(rename = "type")]
    entry_type: &'a str,
    payload: &'a serde_json::Value,
    #[serde(rename = "actorId")]
    actor_id: &'a str,
    timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HashedFields<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    entry_type: &'a str,
    payload: &'a serde_json::Value,
    #[serde(rename = "actorId")]
    actor_id: &'a str,
    timestamp: u64,
}

/// An atomic, signed action recorded on the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub payload: serde_json::Value,
    #[serde(rename = "actorId")]
    pub actor_id: String,
    pub timestamp: u64,
    pub signature: String,
    pub hash: String,
}

impl LedgerEntry {
    /// Builds and signs a new entry authored by a registered participant.
    pub fn new_signed(
        entry_type: EntryType,
        payload: serde_json::Value,
        actor_id: String,
        timestamp: u64,
        priv_pem: &str,
    ) -> Option<Self> {
        let id = crypto::generate_id();
        let signed = SignedFields { entry_type: entry_type.as_str(), payload: &payload, actor_id: &actor_id, timestamp };
        let signature = crypto::sign(&signed, priv_pem)?;
        let hashed = HashedFields { id: &id, entry_type: entry_type.as_str(), payload: &payload, actor_id: &actor_id, timestamp };
        let hash = crypto::hash_value(&hashed);

        Some(LedgerEntry { id, entry_type, payload, actor_id, timestamp, signature, hash })
    }

    /// Builds a system entry. System entries bypass Ed25519 signing; their
    /// `signature` field holds a documentary SHA3-256 of the payload.
    pub fn new_system(entry_type: EntryType, payload: serde_json::Value, timestamp: u64) -> Self {
        let id = crypto::generate_id();
        let actor_id = SYSTEM_ACTOR.to_string();
        let signature = crypto::hash_value(&payload);
        let hashed = HashedFields { id: &id, entry_type: entry_type.as_str(), payload: &payload, actor_id: &actor_id, timestamp };
        let hash = crypto::hash_value(&hashed);

        LedgerEntry { id, entry_type, payload, actor_id, timestamp, signature, hash }
    }

    /// Recomputes this entry's content hash from its other fields.
    pub fn recompute_hash(&self) -> String {
        let hashed = HashedFields {
            id: &self.id,
            entry_type: self.entry_type.as_str(),
            payload: &self.payload,
            actor_id: &self.actor_id,
            timestamp: self.timestamp,
        };
        crypto::hash_value(&hashed)
    }

    /// `true` if the stored hash matches a fresh recomputation.
    pub fn hash_is_valid(&self) -> bool {
        self.recompute_hash() == self.hash
    }

    /// Verifies the actor's signature against a public key. System entries
    /// are always reported valid (the signature field is documentary, not
    /// cryptographic authorization).
    pub fn signature_is_valid(&self, pub_pem: Option<&str>) -> bool {
        if self.actor_id == SYSTEM_ACTOR {
            return true;
        }
        let Some(pub_pem) = pub_pem else { return false };
        let signed = SignedFields {
            entry_type: self.entry_type.as_str(),
            payload: &self.payload,
            actor_id: &self.actor_id,
            timestamp: self.timestamp,
        };
        crypto::verify(&signed, &self.signature, pub_pem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_entry_hash_and_signature_round_trip() {
        let (pub_pem, priv_pem) = crypto::generate_key_pair();
        let fp = crypto::fingerprint_public_key(&pub_pem);

        let entry = LedgerEntry::new_signed(
            EntryType::Register,
            serde_json::json!({"alias": "alice"}),
            fp,
            1_700_000_000,
            &priv_pem,
        )
        .unwrap();

        assert!(entry.hash_is_valid());
        assert!(entry.signature_is_valid(Some(&pub_pem)));
    }

    #[test]
    fn tampered_payload_invalidates_hash() {
        let (pub_pem, priv_pem) = crypto::generate_key_pair();
        let fp = crypto::fingerprint_public_key(&pub_pem);

        let mut entry = LedgerEntry::new_signed(
            EntryType::Register,
            serde_json::json!({"alias": "alice"}),
            fp,
            1_700_000_000,
            &priv_pem,
        )
        .unwrap();

        entry.payload = serde_json::json!({"alias": "mallory"});
        assert!(!entry.hash_is_valid());
    }

    #[test]
    fn system_entries_always_report_valid_signature() {
        let entry = LedgerEntry::new_system(
            EntryType::PetitionThresholdMet,
            serde_json::json!({"proposalId": "p1"}),
            1_700_000_000,
        );
        assert!(entry.signature_is_valid(None));
        assert!(entry.hash_is_valid());
    }
}
