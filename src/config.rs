//! Runtime configuration for a node hosting this crate's components.

use crate::replication::DEFAULT_PORT;

/// Ledger-level knobs.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a mined block hash.
    pub difficulty: usize,
    /// Default petition signer threshold when a caller does not specify one.
    pub default_petition_threshold: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig { difficulty: 2, default_petition_threshold: crate::petition::DEFAULT_THRESHOLD }
    }
}

/// Identity registry knobs.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// How long an issued challenge remains redeemable, in seconds.
    pub challenge_ttl_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig { challenge_ttl_seconds: crate::identity::CHALLENGE_TTL_SECONDS }
    }
}

/// Voting defaults applied when a proposal's own voting config omits them.
#[derive(Clone, Debug)]
pub struct VotingDefaults {
    pub quorum_percent: f64,
    pub pass_percent: f64,
}

impl Default for VotingDefaults {
    fn default() -> Self {
        VotingDefaults { quorum_percent: 10.0, pass_percent: crate::voting::DEFAULT_PASS_PERCENT_THRESHOLD }
    }
}

/// Replication node knobs.
#[derive(Clone, Debug)]
pub struct ReplicationConfig {
    pub node_id: String,
    pub port: u16,
    /// Enables gossip re-verification hardening.
    pub strict: bool,
    pub bootstrap_peers: Vec<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig { node_id: crate::crypto::generate_id(), port: DEFAULT_PORT, strict: false, bootstrap_peers: Vec::new() }
    }
}

/// Top-level configuration aggregating every component's own config, one
/// struct per concern composed under a single root rather than a flat
/// bag of fields.
#[derive(Clone, Debug, Default)]
pub struct GovChainConfig {
    pub ledger: LedgerConfig,
    pub identity: IdentityConfig,
    pub voting: VotingDefaults,
    pub replication: ReplicationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = GovChainConfig::default();
        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.ledger.default_petition_threshold, 300);
        assert_eq!(config.identity.challenge_ttl_seconds, 300);
        assert_eq!(config.voting.quorum_percent, 10.0);
        assert_eq!(config.voting.pass_percent, 50.0);
        assert_eq!(config.replication.port, 4000);
    }
}
