//! Identity registry: public-key-fingerprint identities, challenge/response
//! proof of key possession, and third-party attestations.
//!
//! Every mutating operation here also appends a signed [`LedgerEntry`] to
//! the ledger handle it is given, mirroring how every other registry in
//! this crate treats the ledger as the single source of truth and itself
//! as a cache plus index over it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::GovError;
use crate::ledger::{EntryType, Ledger, LedgerEntry};

/// How long an issued challenge remains redeemable, in seconds.
pub const CHALLENGE_TTL_SECONDS: u64 = 300;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(rename = "attestorId")]
    pub attestor_id: String,
    pub claim: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub alias: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub jurisdiction: String,
    #[serde(rename = "registeredAt")]
    pub registered_at: u64,
    pub revoked: bool,
    pub attestations: Vec<Attestation>,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        !self.revoked
    }
}

struct PendingChallenge {
    nonce: String,
    issued_at: u64,
}

/// Registers identities, adjudicates key-possession challenges, and tracks
/// attestations issued against them.
///
/// Identities, pending challenges, and trusted attestors are three
/// independent maps, not nested inside `Identity`.
pub struct IdentityRegistry {
    identities: HashMap<String, Identity>,
    challenges: HashMap<String, PendingChallenge>,
    trusted_attestors: HashSet<String>,
    challenge_ttl_seconds: u64,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        IdentityRegistry {
            identities: HashMap::new(),
            challenges: HashMap::new(),
            trusted_attestors: HashSet::new(),
            challenge_ttl_seconds: CHALLENGE_TTL_SECONDS,
        }
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        IdentityRegistry::default()
    }

    /// Builds a registry whose challenges expire after `ttl_seconds`
    /// instead of the built-in default, per [`crate::config::IdentityConfig`].
    pub fn with_challenge_ttl(ttl_seconds: u64) -> Self {
        IdentityRegistry { challenge_ttl_seconds: ttl_seconds, ..IdentityRegistry::default() }
    }

    /// Registers a new identity under its public key's fingerprint and
    /// appends a signed `REGISTER` entry to `ledger`.
    pub fn register(
        &mut self,
        ledger: &mut Ledger,
        alias: String,
        public_key: String,
        jurisdiction: String,
        priv_pem: &str,
        timestamp: u64,
    ) -> Result<&Identity, GovError> {
        let id = crypto::fingerprint_public_key(&public_key);
        if self.identities.contains_key(&id) {
            return Err(GovError::duplicate(format!("identity {id} is already registered")));
        }

        let payload = serde_json::json!({
            "publicKey": public_key,
            "alias": alias,
            "jurisdiction": jurisdiction,
        });
        let entry = LedgerEntry::new_signed(EntryType::Register, payload, id.clone(), timestamp, priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        let identity = Identity {
            id: id.clone(),
            alias,
            public_key,
            jurisdiction,
            registered_at: timestamp,
            revoked: false,
            attestations: Vec::new(),
        };
        self.identities.insert(id.clone(), identity);
        Ok(self.identities.get(&id).expect("just inserted"))
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.identities.get(id)
    }

    /// Issues a fresh single-use challenge nonce for `id`, expiring
    /// [`CHALLENGE_TTL_SECONDS`] after `timestamp`. Sweeps any of this
    /// identity's expired challenges before issuing a new one so the map
    /// cannot accumulate stale entries under repeated issuance.
    pub fn issue_challenge(&mut self, id: &str, timestamp: u64) -> Result<String, GovError> {
        if !self.identities.contains_key(id) {
            return Err(GovError::not_found(format!("identity {id}")));
        }
        self.sweep_expired(id, timestamp);

        let nonce = crypto::generate_nonce();
        self.challenges.insert(id.to_string(), PendingChallenge { nonce: nonce.clone(), issued_at: timestamp });
        Ok(nonce)
    }

    /// Verifies a signed response to a previously issued challenge. The
    /// challenge is consumed (single-use) regardless of the outcome.
    pub fn verify_challenge(&mut self, id: &str, signature: &str, timestamp: u64) -> Result<bool, GovError> {
        let identity = self.identities.get(id).ok_or_else(|| GovError::not_found(format!("identity {id}")))?;
        let Some(pending) = self.challenges.remove(id) else {
            return Ok(false);
        };
        if timestamp.saturating_sub(pending.issued_at) > self.challenge_ttl_seconds {
            return Ok(false);
        }
        Ok(crypto::verify_bytes(pending.nonce.as_bytes(), signature, &identity.public_key))
    }

    fn sweep_expired(&mut self, id: &str, timestamp: u64) {
        if let Some(pending) = self.challenges.get(id) {
            if timestamp.saturating_sub(pending.issued_at) > self.challenge_ttl_seconds {
                self.challenges.remove(id);
            }
        }
    }

    /// Adds a trusted attestor. Attestations from untrusted attestors are
    /// still recorded but [`IdentityRegistry::has_attestation`] only
    /// honors trusted ones.
    pub fn add_trusted_attestor(&mut self, attestor_id: String) {
        self.trusted_attestors.insert(attestor_id);
    }

    pub fn is_trusted_attestor(&self, attestor_id: &str) -> bool {
        self.trusted_attestors.contains(attestor_id)
    }

    /// Records an attestation signed by `attestor_id` over `{subject, claim}`
    /// and appends a signed `ATTESTATION` entry.
    pub fn add_attestation(
        &mut self,
        ledger: &mut Ledger,
        id: &str,
        attestor_id: String,
        attestor_priv_pem: &str,
        claim: String,
        timestamp: u64,
    ) -> Result<(), GovError> {
        if !self.identities.contains_key(id) {
            return Err(GovError::not_found(format!("identity {id}")));
        }
        if !self.trusted_attestors.contains(&attestor_id) {
            return Err(GovError::auth(format!("{attestor_id} is not a trusted attestor")));
        }

        let payload = serde_json::json!({"subject": id, "claim": claim});
        let entry = LedgerEntry::new_signed(EntryType::Attestation, payload, attestor_id.clone(), timestamp, attestor_priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        let identity = self.identities.get_mut(id).expect("checked above");
        identity.attestations.push(Attestation { attestor_id, claim, timestamp });
        Ok(())
    }

    pub fn has_attestation(&self, id: &str, claim: &str) -> bool {
        self.identities
            .get(id)
            .map(|identity| {
                identity
                    .attestations
                    .iter()
                    .any(|a| a.claim == claim && self.trusted_attestors.contains(&a.attestor_id))
            })
            .unwrap_or(false)
    }

    /// Self-revokes identity `id`, signed by its own private key, and
    /// appends a signed `REVOKE_IDENTITY` entry.
    pub fn revoke(&mut self, ledger: &mut Ledger, id: &str, priv_pem: &str, timestamp: u64) -> Result<(), GovError> {
        if !self.identities.contains_key(id) {
            return Err(GovError::not_found(format!("identity {id}")));
        }

        let payload = serde_json::json!({"subject": id});
        let entry = LedgerEntry::new_signed(EntryType::RevokeIdentity, payload, id.to_string(), timestamp, priv_pem)
            .ok_or_else(|| GovError::validation("malformed private key"))?;
        ledger.add_entry(entry);

        self.identities.get_mut(id).expect("checked above").revoked = true;
        Ok(())
    }

    pub fn get_by_jurisdiction(&self, jurisdiction: &str) -> Vec<&Identity> {
        self.identities.values().filter(|identity| identity.jurisdiction == jurisdiction).collect()
    }

    /// Counts active (non-revoked) identities eligible under a voting
    /// jurisdiction filter: `"global"` or `None` matches every active
    /// identity, otherwise only identities carrying that exact jurisdiction.
    pub fn count_eligible(&self, jurisdiction_filter: Option<&str>) -> usize {
        self.identities
            .values()
            .filter(|identity| identity.is_active())
            .filter(|identity| match jurisdiction_filter {
                None => true,
                Some(j) if j == "global" => true,
                Some(j) => identity.jurisdiction == j,
            })
            .count()
    }

    pub fn stats(&self) -> IdentityRegistryStats {
        let revoked = self.identities.values().filter(|identity| identity.revoked).count();
        IdentityRegistryStats {
            total: self.identities.len(),
            active: self.identities.len() - revoked,
            revoked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityRegistryStats {
    pub total: usize,
    pub active: usize,
    pub revoked: usize,
}
