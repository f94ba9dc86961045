//! Petition manager: thresholded signature collection with
//! implication-acknowledgement binding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::GovError;
use crate::identity::IdentityRegistry;
use crate::ledger::{EntryType, Ledger, LedgerEntry};
use crate::proposal::{ProposalRegistry, ProposalState};

/// Default signer threshold for a petition.
pub const DEFAULT_THRESHOLD: u64 = 300;

const ACKNOWLEDGEMENT_PREFIX: &str = "I_ACKNOWLEDGE_IMPLICATIONS:";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PetitionSignature {
    pub signer: String,
    #[serde(rename = "implicationsHash")]
    pub implications_hash: String,
    #[serde(rename = "acknowledgementSignature")]
    pub acknowledgement_signature: String,
    #[serde(rename = "petitionSignature")]
    pub petition_signature: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Petition {
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    pub jurisdiction: String,
    pub threshold: u64,
    pub signatures: HashMap<String, PetitionSignature>,
    #[serde(rename = "thresholdMet")]
    pub threshold_met: bool,
    #[serde(rename = "thresholdMetAt")]
    pub threshold_met_at: Option<u64>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

impl Petition {
    pub fn signature_count(&self) -> u64 {
        self.signatures.len() as u64
    }
}

/// Canonical form signed as the `petitionSignature`.
#[derive(Serialize)]
struct PetitionSignPayload<'a> {
    action: &'static str,
    #[serde(rename = "proposalId")]
    proposal_id: &'a str,
    #[serde(rename = "implicationsHash")]
    implications_hash: &'a str,
    signer: &'a str,
}

#[derive(Default)]
pub struct PetitionManager {
    petitions: HashMap<String, Petition>,
}

impl PetitionManager {
    pub fn new() -> Self {
        PetitionManager::default()
    }

    pub fn get(&self, proposal_id: &str) -> Option<&Petition> {
        self.petitions.get(proposal_id)
    }

    /// Opens a petition for a proposal currently in `PETITION`.
    pub fn create_petition(
        &mut self,
        proposals: &ProposalRegistry,
        proposal_id: String,
        threshold: Option<u64>,
        timestamp: u64,
    ) -> Result<&Petition, GovError> {
        let proposal = proposals
            .get(&proposal_id)
            .ok_or_else(|| GovError::not_found(format!("proposal {proposal_id}")))?;
        if proposal.state != ProposalState::Petition {
            return Err(GovError::state(format!("proposal must be in PETITION, is {:?}", proposal.state)));
        }

        let petition = Petition {
            proposal_id: proposal_id.clone(),
            jurisdiction: proposal.jurisdiction.clone(),
            threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
            signatures: HashMap::new(),
            threshold_met: false,
            threshold_met_at: None,
            created_at: timestamp,
        };
        self.petitions.insert(proposal_id.clone(), petition);
        Ok(self.petitions.get(&proposal_id).expect("just inserted"))
    }

    /// Records a signer's petition signature and advances the proposal
    /// PETITION → OPEN the instant the threshold is first crossed.
    pub fn sign(
        &mut self,
        ledger: &mut Ledger,
        proposals: &mut ProposalRegistry,
        identities: &IdentityRegistry,
        proposal_id: &str,
        signer_fp: String,
        signer_priv_pem: &str,
        timestamp: u64,
    ) -> Result<(), GovError> {
        let petition = self.petitions.get(proposal_id).ok_or_else(|| GovError::not_found(format!("petition {proposal_id}")))?;
        if petition.threshold_met {
            return Err(GovError::state("petition threshold has already been met"));
        }
        if petition.signatures.contains_key(&signer_fp) {
            return Err(GovError::duplicate(format!("{signer_fp} has already signed this petition")));
        }

        let signer = identities.get(&signer_fp).ok_or_else(|| GovError::not_found(format!("identity {signer_fp}")))?;
        if !signer.is_active() {
            return Err(GovError::auth("signer identity is revoked"));
        }

        let proposal = proposals
            .get(proposal_id)
            .ok_or_else(|| GovError::not_found(format!("proposal {proposal_id}")))?;
        let implications_hash = crypto::hash_value(&proposal.latest_version().implications);

        let acknowledgement_message = format!("{ACKNOWLEDGEMENT_PREFIX}{implications_hash}");
        let acknowledgement_signature = crypto::sign_bytes(acknowledgement_message.as_bytes(), signer_priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;

        let sign_payload = PetitionSignPayload {
            action: "PETITION_SIGN",
            proposal_id,
            implications_hash: &implications_hash,
            signer: &signer_fp,
        };
        let petition_signature =
            crypto::sign(&sign_payload, signer_priv_pem).ok_or_else(|| GovError::validation("malformed private key"))?;

        let petition = self.petitions.get_mut(proposal_id).expect("checked above");
        petition.signatures.insert(
            signer_fp.clone(),
            PetitionSignature {
                signer: signer_fp.clone(),
                implications_hash: implications_hash.clone(),
                acknowledgement_signature,
                petition_signature,
                timestamp,
            },
        );
        let signature_count = petition.signature_count();
        let threshold = petition.threshold;

        let entry_payload = serde_json::json!({
            "proposalId": proposal_id,
            "signatureId": signer_fp,
            "implicationsHash": implications_hash,
            "signatureCount": signature_count,
            "threshold": threshold,
        });
        let entry = LedgerEntry::new_signed(EntryType::PetitionSign, entry_payload, signer_fp, timestamp, signer_priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        if signature_count >= threshold {
            self.petitions.get_mut(proposal_id).expect("checked above").threshold_met = true;
            self.petitions.get_mut(proposal_id).expect("checked above").threshold_met_at = Some(timestamp);

            let met_payload = serde_json::json!({"proposalId": proposal_id, "signatureCount": signature_count});
            let met_entry = LedgerEntry::new_system(EntryType::PetitionThresholdMet, met_payload, timestamp);
            ledger.add_entry(met_entry);

            proposals.transition_system(ledger, proposal_id, ProposalState::Open, timestamp)?;
        }

        Ok(())
    }

    /// Recomputes the implications hash and re-verifies both of a signer's
    /// stored signatures against their currently-stored public key.
    pub fn verify_signature(
        &self,
        proposals: &ProposalRegistry,
        identities: &IdentityRegistry,
        proposal_id: &str,
        signer_fp: &str,
    ) -> Result<SignatureVerification, GovError> {
        let petition = self.petitions.get(proposal_id).ok_or_else(|| GovError::not_found(format!("petition {proposal_id}")))?;
        let record = petition
            .signatures
            .get(signer_fp)
            .ok_or_else(|| GovError::not_found(format!("no signature from {signer_fp}")))?;
        let proposal = proposals
            .get(proposal_id)
            .ok_or_else(|| GovError::not_found(format!("proposal {proposal_id}")))?;
        let identity = identities.get(signer_fp).ok_or_else(|| GovError::not_found(format!("identity {signer_fp}")))?;

        let expected_hash = crypto::hash_value(&proposal.latest_version().implications);
        if expected_hash != record.implications_hash {
            return Ok(SignatureVerification { valid: false, acknowledgement_valid: false, petition_signature_valid: false });
        }

        let acknowledgement_message = format!("{ACKNOWLEDGEMENT_PREFIX}{expected_hash}");
        let acknowledgement_valid = crypto::verify_bytes(
            acknowledgement_message.as_bytes(),
            &record.acknowledgement_signature,
            &identity.public_key,
        );

        let sign_payload = PetitionSignPayload {
            action: "PETITION_SIGN",
            proposal_id,
            implications_hash: &expected_hash,
            signer: signer_fp,
        };
        let petition_signature_valid = crypto::verify(&sign_payload, &record.petition_signature, &identity.public_key);

        Ok(SignatureVerification {
            valid: acknowledgement_valid && petition_signature_valid,
            acknowledgement_valid,
            petition_signature_valid,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SignatureVerification {
    pub valid: bool,
    #[serde(rename = "acknowledgementValid")]
    pub acknowledgement_valid: bool,
    #[serde(rename = "petitionSignatureValid")]
    pub petition_signature_valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::proposal::ProposalType;

    struct Fixture {
        identities: IdentityRegistry,
        proposals: ProposalRegistry,
        petitions: PetitionManager,
        ledger: Ledger,
        proposal_id: String,
        author_fp: String,
    }

    fn registered(identities: &mut IdentityRegistry, ledger: &mut Ledger, alias: &str, t: u64) -> (String, String) {
        let (pub_pem, priv_pem) = crypto::generate_key_pair();
        identities.register(ledger, alias.to_string(), pub_pem.clone(), "US".to_string(), &priv_pem, t).unwrap();
        (crypto::fingerprint_public_key(&pub_pem), priv_pem)
    }

    fn fixture() -> (Fixture, String) {
        let mut identities = IdentityRegistry::new();
        let mut ledger = Ledger::new(0, 1);
        let (author_fp, author_priv) = registered(&mut identities, &mut ledger, "author", 1_700_000_000);

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
        proposals
            .transition(&mut ledger, &proposal_id, ProposalState::Petition, &author_fp, &author_priv, 1_700_000_002)
            .unwrap();

        let mut petitions = PetitionManager::new();
        petitions.create_petition(&proposals, proposal_id.clone(), Some(2), 1_700_000_003).unwrap();

        (Fixture { identities, proposals, petitions, ledger, proposal_id: proposal_id.clone(), author_fp }, proposal_id)
    }

    #[test]
    fn signing_below_threshold_leaves_proposal_in_petition() {
        let (mut fx, proposal_id) = fixture();
        let (signer_fp, signer_priv) = registered(&mut fx.identities, &mut fx.ledger, "signer-1", 1_700_000_010);

        fx.petitions
            .sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, signer_fp, &signer_priv, 1_700_000_011)
            .unwrap();

        assert_eq!(fx.proposals.get(&proposal_id).unwrap().state, ProposalState::Petition);
        assert!(!fx.petitions.get(&proposal_id).unwrap().threshold_met);
    }

    #[test]
    fn crossing_threshold_advances_proposal_to_open() {
        let (mut fx, proposal_id) = fixture();
        let (fp1, priv1) = registered(&mut fx.identities, &mut fx.ledger, "signer-1", 1_700_000_010);
        let (fp2, priv2) = registered(&mut fx.identities, &mut fx.ledger, "signer-2", 1_700_000_011);

        fx.petitions
            .sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, fp1, &priv1, 1_700_000_012)
            .unwrap();
        fx.petitions
            .sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, fp2, &priv2, 1_700_000_013)
            .unwrap();

        assert!(fx.petitions.get(&proposal_id).unwrap().threshold_met);
        assert_eq!(fx.proposals.get(&proposal_id).unwrap().state, ProposalState::Open);
    }

    #[test]
    fn duplicate_signature_from_same_signer_is_rejected() {
        let (mut fx, proposal_id) = fixture();
        let (fp1, priv1) = registered(&mut fx.identities, &mut fx.ledger, "signer-1", 1_700_000_010);

        fx.petitions
            .sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, fp1.clone(), &priv1, 1_700_000_011)
            .unwrap();
        let result =
            fx.petitions.sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, fp1, &priv1, 1_700_000_012);
        assert!(result.is_err());
    }

    #[test]
    fn verify_signature_reports_valid_for_an_untampered_signer() {
        let (mut fx, proposal_id) = fixture();
        let (fp1, priv1) = registered(&mut fx.identities, &mut fx.ledger, "signer-1", 1_700_000_010);
        fx.petitions
            .sign(&mut fx.ledger, &mut fx.proposals, &fx.identities, &proposal_id, fp1.clone(), &priv1, 1_700_000_011)
            .unwrap();

        let verification = fx.petitions.verify_signature(&fx.proposals, &fx.identities, &proposal_id, &fp1).unwrap();
        assert!(verification.valid);
        assert!(verification.acknowledgement_valid);
        assert!(verification.petition_signature_valid);
        let _ = &fx.author_fp;
    }
}
