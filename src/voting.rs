//! Commit-reveal voting engine: per-proposal session, tally, and ballot
//! Merkle root.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::GovError;
use crate::identity::IdentityRegistry;
use crate::ledger::{EntryType, Ledger, LedgerEntry};
use crate::proposal::{ProposalRegistry, ProposalState};

/// Default pass-percent threshold, applied unless a proposal's voting
/// config overrides it.
pub const DEFAULT_PASS_PERCENT_THRESHOLD: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Choice {
    Yea,
    Nay,
    Abstain,
}

impl Choice {
    /// The wire/hash representation of this choice, used both to build and
    /// to open commit-reveal commitments. Public so callers outside this
    /// crate (an HTTP layer, a CLI) can compute a commitment for a choice
    /// before it is ever submitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Yea => "YEA",
            Choice::Nay => "NAY",
            Choice::Abstain => "ABSTAIN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VotePhase {
    Commit,
    Reveal,
    Tally,
    Closed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ballot {
    pub id: String,
    #[serde(rename = "voterFingerprint")]
    pub voter_fingerprint: String,
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    pub choice: Choice,
    pub nonce: String,
    pub commitment: String,
    pub revealed: bool,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TallyResult {
    pub yea: u64,
    pub nay: u64,
    pub abstain: u64,
    #[serde(rename = "totalRevealed")]
    pub total_revealed: u64,
    #[serde(rename = "eligibleVoters")]
    pub eligible_voters: u64,
    #[serde(rename = "quorumMet")]
    pub quorum_met: bool,
    #[serde(rename = "passPercent")]
    pub pass_percent: f64,
    pub passed: bool,
    #[serde(rename = "ballotMerkleRoot")]
    pub ballot_merkle_root: String,
}

pub struct VotingSession {
    pub proposal_id: String,
    pub phase: VotePhase,
    commitments: HashMap<String, String>,
    ballots: HashMap<String, Ballot>,
    pub tally_result: Option<TallyResult>,
}

impl VotingSession {
    fn new(proposal_id: String) -> Self {
        VotingSession { proposal_id, phase: VotePhase::Commit, commitments: HashMap::new(), ballots: HashMap::new() }
    }

    pub fn commitment_count(&self) -> usize {
        self.commitments.len()
    }

    pub fn ballot(&self, voter_fp: &str) -> Option<&Ballot> {
        self.ballots.get(voter_fp)
    }
}

/// Owns one [`VotingSession`] per proposal under active or completed
/// voting, and drives the proposal through `VOTING -> TALLYING ->
/// {ENACTED, REJECTED}`.
#[derive(Default)]
pub struct VotingManager {
    sessions: HashMap<String, VotingSession>,
}

impl VotingManager {
    pub fn new() -> Self {
        VotingManager::default()
    }

    pub fn session(&self, proposal_id: &str) -> Option<&VotingSession> {
        self.sessions.get(proposal_id)
    }

    /// Transitions a proposal `OPEN -> VOTING` and opens a fresh session.
    pub fn open_voting(
        &mut self,
        ledger: &mut Ledger,
        proposals: &mut ProposalRegistry,
        proposal_id: &str,
        actor_fp: &str,
        actor_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        proposals.transition(ledger, proposal_id, ProposalState::Voting, actor_fp, actor_priv_pem, timestamp)?;
        self.sessions.insert(proposal_id.to_string(), VotingSession::new(proposal_id.to_string()));
        Ok(())
    }

    /// Records a voter's commitment. Rejects voters who are unregistered,
    /// revoked, outside the configured eligible jurisdiction, or who have
    /// already committed.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_commitment(
        &mut self,
        ledger: &mut Ledger,
        identities: &IdentityRegistry,
        proposals: &ProposalRegistry,
        proposal_id: &str,
        voter_fp: String,
        commitment_hex: String,
        voter_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let session = self.sessions.get(proposal_id).ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?;
        if session.phase != VotePhase::Commit {
            return Err(GovError::state("commitments are only accepted during the COMMIT phase"));
        }
        if session.commitments.contains_key(&voter_fp) {
            return Err(GovError::duplicate(format!("{voter_fp} has already committed")));
        }

        let voter = identities.get(&voter_fp).ok_or_else(|| GovError::not_found(format!("identity {voter_fp}")))?;
        if !voter.is_active() {
            return Err(GovError::auth("voter identity is revoked"));
        }

        let proposal = proposals.get(proposal_id).ok_or_else(|| GovError::not_found(format!("proposal {proposal_id}")))?;
        if let Some(config) = &proposal.voting_config {
            if let Some(required) = &config.eligible_jurisdiction {
                if required != "global" && voter.jurisdiction != *required {
                    return Err(GovError::auth("voter is outside the eligible jurisdiction for this proposal"));
                }
            }
        }

        let entry_payload = serde_json::json!({"proposalId": proposal_id, "commitment": commitment_hex});
        let entry = LedgerEntry::new_signed(EntryType::VoteCommit, entry_payload, voter_fp.clone(), timestamp, voter_priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        self.sessions.get_mut(proposal_id).expect("checked above").commitments.insert(voter_fp, commitment_hex);
        Ok(())
    }

    /// Transitions a session `COMMIT -> REVEAL` exclusively.
    pub fn start_reveal_phase(&mut self, proposal_id: &str) -> Result<(), GovError> {
        let session = self.sessions.get_mut(proposal_id).ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?;
        if session.phase != VotePhase::Commit {
            return Err(GovError::state("reveal phase can only be started from COMMIT"));
        }
        session.phase = VotePhase::Reveal;
        Ok(())
    }

    /// Reveals a voter's ballot, checking it against their stored
    /// commitment.
    pub fn reveal_vote(
        &mut self,
        ledger: &mut Ledger,
        proposal_id: &str,
        voter_fp: String,
        choice: Choice,
        nonce: String,
        voter_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let session = self.sessions.get(proposal_id).ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?;
        if session.phase != VotePhase::Reveal {
            return Err(GovError::state("votes can only be revealed during the REVEAL phase"));
        }
        let commitment = session
            .commitments
            .get(&voter_fp)
            .ok_or_else(|| GovError::not_found(format!("no commitment recorded for {voter_fp}")))?
            .clone();
        if !crypto::open_commitment(choice.as_str(), &nonce, &commitment) {
            return Err(GovError::auth("revealed choice/nonce does not open the stored commitment"));
        }

        let ballot_id = crypto::generate_id();
        let entry_payload =
            serde_json::json!({"proposalId": proposal_id, "choice": choice, "nonce": nonce, "ballotId": ballot_id});
        let entry = LedgerEntry::new_signed(EntryType::VoteReveal, entry_payload, voter_fp.clone(), timestamp, voter_priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        let ballot = Ballot {
            id: ballot_id,
            voter_fingerprint: voter_fp.clone(),
            proposal_id: proposal_id.to_string(),
            choice,
            nonce,
            commitment,
            revealed: true,
            timestamp,
        };
        self.sessions.get_mut(proposal_id).expect("checked above").ballots.insert(voter_fp, ballot);
        Ok(())
    }

    /// Tallies a session in REVEAL, moving it through TALLY to CLOSED.
    pub fn tally(
        &mut self,
        ledger: &mut Ledger,
        identities: &IdentityRegistry,
        proposals: &ProposalRegistry,
        proposal_id: &str,
        timestamp: u64,
    ) -> Result<&TallyResult, GovError> {
        let session = self.sessions.get(proposal_id).ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?;
        if session.phase != VotePhase::Reveal {
            return Err(GovError::state("tally can only run from the REVEAL phase"));
        }

        let proposal = proposals.get(proposal_id).ok_or_else(|| GovError::not_found(format!("proposal {proposal_id}")))?;
        let config = proposal.voting_config.as_ref();
        let quorum_percent = config.map(|c| c.quorum_percent).unwrap_or(10.0);
        let pass_percent_threshold = config.map(|c| c.pass_percent).unwrap_or(DEFAULT_PASS_PERCENT_THRESHOLD);
        let eligible_jurisdiction = config.and_then(|c| c.eligible_jurisdiction.as_deref());

        let mut ballots: Vec<&Ballot> = session.ballots.values().collect();
        ballots.sort_by(|a, b| a.voter_fingerprint.cmp(&b.voter_fingerprint));

        let mut yea = 0u64;
        let mut nay = 0u64;
        let mut abstain = 0u64;
        let leaves: Vec<String> = ballots
            .iter()
            .map(|b| {
                match b.choice {
                    Choice::Yea => yea += 1,
                    Choice::Nay => nay += 1,
                    Choice::Abstain => abstain += 1,
                }
                crypto::hash_value(&serde_json::json!({
                    "voter": b.voter_fingerprint,
                    "choice": b.choice,
                    "nonce": b.nonce,
                }))
            })
            .collect();

        let total_revealed = yea + nay + abstain;
        let ballot_merkle_root = crate::crypto::MerkleTree::new(leaves).root();

        let eligible_voters = identities.count_eligible(eligible_jurisdiction) as u64;
        let quorum_met = (total_revealed as f64 / (eligible_voters.max(1)) as f64) * 100.0 >= quorum_percent;
        let decided = yea + nay;
        let raw_pass_percent = if decided == 0 { 0.0 } else { (yea as f64 / decided as f64) * 100.0 };
        let pass_percent = (raw_pass_percent * 100.0).round() / 100.0;
        let passed = quorum_met && pass_percent > pass_percent_threshold;

        let result = TallyResult {
            yea,
            nay,
            abstain,
            total_revealed,
            eligible_voters,
            quorum_met,
            pass_percent,
            passed,
            ballot_merkle_root,
        };

        let entry_payload = serde_json::json!({
            "proposalId": proposal_id,
            "yea": result.yea,
            "nay": result.nay,
            "abstain": result.abstain,
            "totalRevealed": result.total_revealed,
            "eligibleVoters": result.eligible_voters,
            "quorumMet": result.quorum_met,
            "passPercent": result.pass_percent,
            "passed": result.passed,
            "ballotMerkleRoot": result.ballot_merkle_root,
        });
        let entry = LedgerEntry::new_system(EntryType::VoteTally, entry_payload, timestamp);
        ledger.add_entry(entry);

        let session = self.sessions.get_mut(proposal_id).expect("checked above");
        session.phase = VotePhase::Closed;
        session.tally_result = Some(result);
        Ok(session.tally_result.as_ref().expect("just set"))
    }

    /// Finalises voting for a proposal: auto-advances COMMIT -> REVEAL if
    /// still open, tallies, and transitions the proposal `VOTING ->
    /// TALLYING -> {ENACTED, REJECTED}`, attaching the tally result.
    pub fn finalise(
        &mut self,
        ledger: &mut Ledger,
        proposals: &mut ProposalRegistry,
        identities: &IdentityRegistry,
        proposal_id: &str,
        actor_fp: &str,
        actor_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let phase = self
            .sessions
            .get(proposal_id)
            .ok_or_else(|| GovError::not_found(format!("voting session {proposal_id}")))?
            .phase;
        if phase == VotePhase::Commit {
            self.start_reveal_phase(proposal_id)?;
        }

        let result = self.tally(ledger, identities, proposals, proposal_id, timestamp)?.clone();

        proposals.transition(ledger, proposal_id, ProposalState::Tallying, actor_fp, actor_priv_pem, timestamp)?;
        let outcome = if result.passed { ProposalState::Enacted } else { ProposalState::Rejected };
        proposals.transition_system(ledger, proposal_id, outcome, timestamp)?;
        proposals.set_tally_result(proposal_id, serde_json::to_value(&result).expect("tally result is serializable"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::proposal::{ProposalRegistry, ProposalType, VotingConfig};

    struct Fixture {
        identities: IdentityRegistry,
        proposals: ProposalRegistry,
        voting: VotingManager,
        ledger: Ledger,
        proposal_id: String,
        author_fp: String,
        author_priv: String,
    }

    fn registered(identities: &mut IdentityRegistry, ledger: &mut Ledger, alias: &str, jurisdiction: &str, t: u64) -> (String, String) {
        let (pub_pem, priv_pem) = crypto::generate_key_pair();
        identities.register(ledger, alias.to_string(), pub_pem.clone(), jurisdiction.to_string(), &priv_pem, t).unwrap();
        (crypto::fingerprint_public_key(&pub_pem), priv_pem)
    }

    fn fixture(eligible_jurisdiction: Option<&str>) -> Fixture {
        let mut identities = IdentityRegistry::new();
        let mut ledger = Ledger::new(0, 1);
        let (author_fp, author_priv) = registered(&mut identities, &mut ledger, "author", "US", 1_700_000_000);

        let mut proposals = ProposalRegistry::new();
        let proposal_id = proposals
            .create(
                &mut ledger,
                &identities,
                ProposalType::Law,
                "Title".to_string(),
                "Full text".to_string(),
                "Summary".to_string(),
                vec!["raises taxes".to_string()],
                "US".to_string(),
                None,
                author_fp.clone(),
                &author_priv,
                1_700_000_001,
            )
            .unwrap()
            .id
            .clone();
        proposals.transition(&mut ledger, &proposal_id, ProposalState::Open, &author_fp, &author_priv, 1_700_000_002).unwrap();
        proposals
            .set_voting_config(
                &proposal_id,
                VotingConfig::new(1_700_000_000, 1_700_100_000, eligible_jurisdiction.map(|s| s.to_string())),
            )
            .unwrap();

        Fixture {
            identities,
            proposals,
            voting: VotingManager::new(),
            ledger,
            proposal_id,
            author_fp,
            author_priv,
        }
    }

    #[test]
    fn happy_path_vote_tallies_match_expected_counts() {
        let mut fx = fixture(None);
        fx.voting
            .open_voting(&mut fx.ledger, &mut fx.proposals, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_003)
            .unwrap();

        let choices = [Choice::Yea, Choice::Yea, Choice::Yea, Choice::Yea, Choice::Nay, Choice::Nay];
        let mut voters = Vec::new();
        for (i, choice) in choices.iter().enumerate() {
            let (fp, priv_pem) = registered(&mut fx.identities, &mut fx.ledger, &format!("voter-{i}"), "US", 1_700_000_004);
            let nonce = crypto::generate_nonce();
            let (commitment, nonce) = crypto::create_commitment(choice.as_str(), Some(nonce));
            fx.voting
                .submit_commitment(
                    &mut fx.ledger,
                    &fx.identities,
                    &fx.proposals,
                    &fx.proposal_id,
                    fp.clone(),
                    commitment,
                    &priv_pem,
                    1_700_000_005,
                )
                .unwrap();
            voters.push((fp, priv_pem, *choice, nonce));
        }

        fx.voting.start_reveal_phase(&fx.proposal_id).unwrap();
        for (fp, priv_pem, choice, nonce) in &voters {
            fx.voting
                .reveal_vote(&mut fx.ledger, &fx.proposal_id, fp.clone(), *choice, nonce.clone(), priv_pem, 1_700_000_006)
                .unwrap();
        }

        let result = fx.voting.tally(&mut fx.ledger, &fx.identities, &fx.proposals, &fx.proposal_id, 1_700_000_007).unwrap();
        assert_eq!(result.yea, 4);
        assert_eq!(result.nay, 2);
        assert_eq!(result.abstain, 0);
        assert_eq!(result.pass_percent, 66.67);
        assert!(result.passed);
        assert_eq!(result.ballot_merkle_root.len(), 64);
    }

    #[test]
    fn commit_mismatch_is_rejected_and_no_ballot_is_recorded() {
        let mut fx = fixture(None);
        fx.voting
            .open_voting(&mut fx.ledger, &mut fx.proposals, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_003)
            .unwrap();
        let (fp, priv_pem) = registered(&mut fx.identities, &mut fx.ledger, "voter-0", "US", 1_700_000_004);
        let (commitment, nonce) = crypto::create_commitment(Choice::Yea.as_str(), None);
        fx.voting
            .submit_commitment(&mut fx.ledger, &fx.identities, &fx.proposals, &fx.proposal_id, fp.clone(), commitment, &priv_pem, 1_700_000_005)
            .unwrap();

        fx.voting.start_reveal_phase(&fx.proposal_id).unwrap();
        let result =
            fx.voting.reveal_vote(&mut fx.ledger, &fx.proposal_id, fp.clone(), Choice::Nay, nonce, &priv_pem, 1_700_000_006);
        assert!(result.is_err());
        assert!(fx.voting.session(&fx.proposal_id).unwrap().ballot(&fp).is_none());
    }

    #[test]
    fn jurisdiction_filter_rejects_voters_outside_it_and_global_accepts_any() {
        let mut fx = fixture(Some("US-CA"));
        fx.voting
            .open_voting(&mut fx.ledger, &mut fx.proposals, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_003)
            .unwrap();
        let (fp, priv_pem) = registered(&mut fx.identities, &mut fx.ledger, "voter-0", "US-NY", 1_700_000_004);
        let (commitment, _) = crypto::create_commitment(Choice::Yea.as_str(), None);
        let result = fx.voting.submit_commitment(
            &mut fx.ledger,
            &fx.identities,
            &fx.proposals,
            &fx.proposal_id,
            fp,
            commitment,
            &priv_pem,
            1_700_000_005,
        );
        assert!(result.is_err());
    }

    #[test]
    fn global_jurisdiction_accepts_any_registered_voter() {
        let mut fx = fixture(Some("global"));
        fx.voting
            .open_voting(&mut fx.ledger, &mut fx.proposals, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_003)
            .unwrap();
        let (fp, priv_pem) = registered(&mut fx.identities, &mut fx.ledger, "voter-0", "US-NY", 1_700_000_004);
        let (commitment, _) = crypto::create_commitment(Choice::Yea.as_str(), None);
        let result = fx.voting.submit_commitment(
            &mut fx.ledger,
            &fx.identities,
            &fx.proposals,
            &fx.proposal_id,
            fp,
            commitment,
            &priv_pem,
            1_700_000_005,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn finalise_enacts_a_passing_proposal() {
        let mut fx = fixture(None);
        fx.voting
            .open_voting(&mut fx.ledger, &mut fx.proposals, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_003)
            .unwrap();
        let (fp, priv_pem) = registered(&mut fx.identities, &mut fx.ledger, "voter-0", "US", 1_700_000_004);
        let (commitment, nonce) = crypto::create_commitment(Choice::Yea.as_str(), None);
        fx.voting
            .submit_commitment(&mut fx.ledger, &fx.identities, &fx.proposals, &fx.proposal_id, fp.clone(), commitment, &priv_pem, 1_700_000_005)
            .unwrap();

        fx.voting.start_reveal_phase(&fx.proposal_id).unwrap();
        fx.voting
            .reveal_vote(&mut fx.ledger, &fx.proposal_id, fp.clone(), Choice::Yea, nonce, &priv_pem, 1_700_000_006)
            .unwrap();

        fx.voting
            .finalise(&mut fx.ledger, &mut fx.proposals, &fx.identities, &fx.proposal_id, &fx.author_fp, &fx.author_priv, 1_700_000_010)
            .unwrap();

        assert_eq!(fx.proposals.get(&fx.proposal_id).unwrap().state, ProposalState::Enacted);
        assert!(fx.proposals.get(&fx.proposal_id).unwrap().tally_result.is_some());
    }
}
