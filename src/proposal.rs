//! Proposal registry: versioned legislative items and their lifecycle
//! state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::GovError;
use crate::identity::IdentityRegistry;
use crate::ledger::{EntryType, Ledger, LedgerEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalType {
    Law,
    Amendment,
    Repeal,
    Resolution,
}

/// A proposal's lifecycle state.
///
/// Kept as an exhaustive enum with a transition table rather than raw
/// strings, per the corpus's preference for tagged unions over string
/// comparisons at call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalState {
    Draft,
    Petition,
    Open,
    Voting,
    Tallying,
    Enacted,
    Rejected,
    Expired,
    Amended,
}

impl ProposalState {
    /// Whether `self -> next` is a permitted transition.
    pub fn can_transition_to(self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Draft, Petition)
                | (Draft, Open)
                | (Petition, Open)
                | (Petition, Expired)
                | (Open, Voting)
                | (Open, Expired)
                | (Voting, Tallying)
                | (Tallying, Enacted)
                | (Tallying, Rejected)
                | (Enacted, Amended)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalVersion {
    #[serde(rename = "fullText")]
    pub full_text: String,
    pub summary: String,
    pub implications: Vec<String>,
    pub hash: String,
}

impl ProposalVersion {
    fn new(full_text: String, summary: String, implications: Vec<String>) -> Self {
        let hash = hash_version_fields(&full_text, &summary, &implications);
        ProposalVersion { full_text, summary, implications, hash }
    }
}

fn hash_version_fields(full_text: &str, summary: &str, implications: &[String]) -> String {
    let value = serde_json::json!({
        "fullText": full_text,
        "summary": summary,
        "implications": implications,
    });
    crypto::hash_value(&value)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VotingConfig {
    #[serde(rename = "startTime")]
    pub start_time: u64,
    #[serde(rename = "endTime")]
    pub end_time: u64,
    #[serde(rename = "quorumPercent")]
    pub quorum_percent: f64,
    #[serde(rename = "passPercent")]
    pub pass_percent: f64,
    #[serde(rename = "eligibleJurisdiction")]
    pub eligible_jurisdiction: Option<String>,
}

impl VotingConfig {
    pub fn new(start_time: u64, end_time: u64, eligible_jurisdiction: Option<String>) -> Self {
        VotingConfig { start_time, end_time, quorum_percent: 10.0, pass_percent: 50.0, eligible_jurisdiction }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    pub title: String,
    pub jurisdiction: String,
    #[serde(rename = "amendmentOf")]
    pub amendment_of: Option<String>,
    #[serde(rename = "authorFingerprint")]
    pub author_fingerprint: String,
    pub state: ProposalState,
    pub versions: Vec<ProposalVersion>,
    #[serde(rename = "votingConfig")]
    pub voting_config: Option<VotingConfig>,
    #[serde(rename = "tallyResult")]
    pub tally_result: Option<serde_json::Value>,
}

impl Proposal {
    pub fn latest_version(&self) -> &ProposalVersion {
        self.versions.last().expect("a proposal always has at least one version")
    }
}

/// Owns proposals and enforces the lifecycle state machine. Like
/// [`crate::identity::IdentityRegistry`], it is handed a ledger to append
/// signed entries to rather than owning one itself.
#[derive(Default)]
pub struct ProposalRegistry {
    proposals: HashMap<String, Proposal>,
}

impl ProposalRegistry {
    pub fn new() -> Self {
        ProposalRegistry::default()
    }

    pub fn get(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// Creates a new proposal in `DRAFT`, requiring a registered,
    /// non-revoked author and at least one implication.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        ledger: &mut Ledger,
        identities: &IdentityRegistry,
        proposal_type: ProposalType,
        title: String,
        full_text: String,
        summary: String,
        implications: Vec<String>,
        jurisdiction: String,
        amendment_of: Option<String>,
        author_fingerprint: String,
        author_priv_pem: &str,
        timestamp: u64,
    ) -> Result<&Proposal, GovError> {
        let author = identities
            .get(&author_fingerprint)
            .ok_or_else(|| GovError::not_found(format!("identity {author_fingerprint}")))?;
        if !author.is_active() {
            return Err(GovError::auth("author identity is revoked"));
        }
        if implications.is_empty() {
            return Err(GovError::validation("a proposal requires at least one implication"));
        }

        let id = crypto::generate_id();
        let version = ProposalVersion::new(full_text.clone(), summary.clone(), implications.clone());

        let payload = serde_json::json!({
            "proposalId": id,
            "type": proposal_type,
            "title": title,
            "jurisdiction": jurisdiction,
            "amendmentOf": amendment_of,
            "versionHash": version.hash,
        });
        let entry =
            LedgerEntry::new_signed(EntryType::ProposalCreate, payload, author_fingerprint.clone(), timestamp, author_priv_pem)
                .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        let proposal = Proposal {
            id: id.clone(),
            proposal_type,
            title,
            jurisdiction,
            amendment_of,
            author_fingerprint,
            state: ProposalState::Draft,
            versions: vec![version],
            voting_config: None,
            tally_result: None,
        };
        self.proposals.insert(id.clone(), proposal);
        Ok(self.proposals.get(&id).expect("just inserted"))
    }

    /// Appends a new version. Permitted only while the proposal is in
    /// `DRAFT` or `OPEN`; prior versions are never mutated.
    pub fn add_version(
        &mut self,
        id: &str,
        full_text: String,
        summary: String,
        implications: Vec<String>,
    ) -> Result<(), GovError> {
        let proposal = self.proposals.get_mut(id).ok_or_else(|| GovError::not_found(format!("proposal {id}")))?;
        if !matches!(proposal.state, ProposalState::Draft | ProposalState::Open) {
            return Err(GovError::state(format!("cannot add a version while proposal is {:?}", proposal.state)));
        }
        proposal.versions.push(ProposalVersion::new(full_text, summary, implications));
        Ok(())
    }

    pub fn set_voting_config(&mut self, id: &str, config: VotingConfig) -> Result<(), GovError> {
        let proposal = self.proposals.get_mut(id).ok_or_else(|| GovError::not_found(format!("proposal {id}")))?;
        proposal.voting_config = Some(config);
        Ok(())
    }

    /// Attaches the final tally result to a proposal (called by the voting
    /// engine on finalisation, not a public lifecycle transition itself).
    pub fn set_tally_result(&mut self, id: &str, tally_result: serde_json::Value) -> Result<(), GovError> {
        let proposal = self.proposals.get_mut(id).ok_or_else(|| GovError::not_found(format!("proposal {id}")))?;
        proposal.tally_result = Some(tally_result);
        Ok(())
    }

    /// Performs a state transition if permitted, appending a signed
    /// `PROPOSAL_STATE_CHANGE` entry. `actor_fingerprint`/`actor_priv_pem`
    /// identify whoever is driving the transition (often the ledger system
    /// actor for automatic ones like threshold-met advancement).
    pub fn transition(
        &mut self,
        ledger: &mut Ledger,
        id: &str,
        next: ProposalState,
        actor_fingerprint: &str,
        actor_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let proposal = self.proposals.get(id).ok_or_else(|| GovError::not_found(format!("proposal {id}")))?;
        if !proposal.state.can_transition_to(next) {
            return Err(GovError::state(format!("cannot transition proposal from {:?} to {next:?}", proposal.state)));
        }

        let payload = serde_json::json!({"proposalId": id, "from": proposal.state, "to": next});
        let entry = LedgerEntry::new_signed(
            EntryType::ProposalStateChange,
            payload,
            actor_fingerprint.to_string(),
            timestamp,
            actor_priv_pem,
        )
        .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        self.proposals.get_mut(id).expect("checked above").state = next;
        Ok(())
    }

    /// Same as [`ProposalRegistry::transition`] but signed by the ledger's
    /// documentary SYSTEM actor, for automatic advancements the ledger
    /// itself drives (petition threshold met, tally completion).
    pub fn transition_system(
        &mut self,
        ledger: &mut Ledger,
        id: &str,
        next: ProposalState,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let proposal = self.proposals.get(id).ok_or_else(|| GovError::not_found(format!("proposal {id}")))?;
        if !proposal.state.can_transition_to(next) {
            return Err(GovError::state(format!("cannot transition proposal from {:?} to {next:?}", proposal.state)));
        }

        let payload = serde_json::json!({"proposalId": id, "from": proposal.state, "to": next});
        let entry = LedgerEntry::new_system(EntryType::ProposalStateChange, payload, timestamp);
        ledger.add_entry(entry);

        self.proposals.get_mut(id).expect("checked above").state = next;
        Ok(())
    }
}
