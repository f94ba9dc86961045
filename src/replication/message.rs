//! Wire messages exchanged between replication nodes.

use serde::{Deserialize, Serialize};

use crate::ledger::{Block, LedgerEntry};

/// Default TCP listen port for a replication node.
pub const DEFAULT_PORT: u16 = 4000;

/// A single peer-to-peer message. Framed as one newline-delimited JSON
/// object per message; the discriminator lives in `kind` via serde's
/// internally-tagged representation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    #[serde(rename = "HANDSHAKE")]
    Handshake { #[serde(rename = "nodeId")] node_id: String, port: u16 },
    #[serde(rename = "REQUEST_CHAIN")]
    RequestChain,
    #[serde(rename = "CHAIN_RESPONSE")]
    ChainResponse { ledger: serde_json::Value },
    #[serde(rename = "NEW_BLOCK")]
    NewBlock { block: Block },
    #[serde(rename = "NEW_ENTRY")]
    NewEntry { entry: LedgerEntry },
    #[serde(rename = "REQUEST_PEERS")]
    RequestPeers,
    #[serde(rename = "PEER_LIST")]
    PeerList { peers: Vec<String> },
}

impl Message {
    /// Serializes this message as a single line (including the trailing
    /// `\n` frame delimiter) ready to write to a socket.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("message is always serializable");
        line.push('\n');
        line
    }

    /// Parses a single received line. Malformed lines are not an error at
    /// this layer; callers are expected to drop them silently and log at
    /// the call site.
    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim_end()).ok()
    }
}
