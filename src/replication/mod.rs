//! Peer-to-peer replication: newline-delimited JSON framing over TCP,
//! handshake, longest-valid-chain adoption, and entry/block gossip.

mod message;

pub use message::{Message, DEFAULT_PORT};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::ledger::{Block, Ledger, LedgerEntry};

/// A running (or connectable) replication endpoint wrapping a shared
/// ledger handle: every mutation of `ledger` here goes through the same
/// `Arc<Mutex<Ledger>>` the rest of the process uses, so there is a
/// single logical owner of chain state per node.
pub struct ReplicationNode {
    node_id: String,
    port: u16,
    ledger: Arc<Mutex<Ledger>>,
    peers: Mutex<HashMap<String, String>>,
    /// When true, re-verifies blocks received via `NEW_BLOCK` (recomputed
    /// hash, per-entry hash, Merkle root) before appending, rather than
    /// trusting the sender as the base protocol does. Recommended for
    /// production use but not required for basic operation.
    strict: bool,
}

impl ReplicationNode {
    pub fn new(node_id: String, port: u16, ledger: Arc<Mutex<Ledger>>) -> Arc<Self> {
        Arc::new(ReplicationNode { node_id, port, ledger, peers: Mutex::new(HashMap::new()), strict: false })
    }

    /// Builds a node with gossip re-verification hardening enabled.
    pub fn new_strict(node_id: String, port: u16, ledger: Arc<Mutex<Ledger>>) -> Arc<Self> {
        Arc::new(ReplicationNode { node_id, port, ledger, peers: Mutex::new(HashMap::new()), strict: true })
    }

    pub async fn known_peers(&self) -> Vec<String> {
        self.peers.lock().await.values().cloned().collect()
    }

    /// Binds the listen socket and serves connections until the process
    /// shuts down. Each accepted connection is handled on its own task.
    pub async fn listen(self: &Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(node_id = %self.node_id, port = self.port, "replication node listening");

        loop {
            let (stream, remote) = listener.accept().await?;
            let node = Arc::clone(self);
            tracing::debug!(%remote, "accepted peer connection");
            tokio::spawn(async move {
                if let Err(error) = node.serve_connection(stream).await {
                    tracing::warn!(%error, "replication connection ended with an error");
                }
            });
        }
    }

    /// Dials a peer, sends our handshake followed by a chain sync request,
    /// and serves the connection thereafter (adopting the peer's chain in
    /// reply if it is valid and strictly longer than ours).
    pub async fn connect_to_peer(self: &Arc<Self>, addr: &str) -> std::io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        let node = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = node.serve_connection_as_initiator(stream).await {
                tracing::warn!(%error, "outbound replication connection ended with an error");
            }
        });
        Ok(())
    }

    async fn serve_connection(self: &Arc<Self>, stream: TcpStream) -> std::io::Result<()> {
        self.run_connection(stream, false).await
    }

    async fn serve_connection_as_initiator(self: &Arc<Self>, stream: TcpStream) -> std::io::Result<()> {
        self.run_connection(stream, true).await
    }

    async fn run_connection(self: &Arc<Self>, stream: TcpStream, initiated: bool) -> std::io::Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        if initiated {
            let handshake = Message::Handshake { node_id: self.node_id.clone(), port: self.port };
            write_half.write_all(handshake.to_line().as_bytes()).await?;
            // Immediately ask the peer for its chain so a freshly dialed
            // connection catches us up rather than waiting for the next
            // unsolicited gossip message.
            write_half.write_all(Message::RequestChain.to_line().as_bytes()).await?;
        }

        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }

            let Some(message) = Message::from_line(&line) else {
                tracing::debug!(raw = %line.trim_end(), "dropping malformed replication message");
                continue;
            };

            if let Some(reply) = self.handle_message(message, initiated).await {
                write_half.write_all(reply.to_line().as_bytes()).await?;
            }
        }
        Ok(())
    }

    /// Applies one received message, returning an optional reply to write
    /// back on the same connection. `initiated` is `true` when we dialed
    /// this connection (and so already sent our own handshake up front) —
    /// an inbound `Handshake` on such a connection is the peer's reply to
    /// ours and must not itself be answered with another handshake, or two
    /// nodes would volley handshakes forever.
    async fn handle_message(self: &Arc<Self>, message: Message, initiated: bool) -> Option<Message> {
        match message {
            Message::Handshake { node_id, port } => {
                tracing::info!(peer_node_id = %node_id, peer_port = port, "peer_connected");
                self.peers.lock().await.insert(node_id.clone(), format!("peer:{port}"));
                if initiated {
                    None
                } else {
                    Some(Message::Handshake { node_id: self.node_id.clone(), port: self.port })
                }
            }
            Message::RequestChain => {
                let ledger = self.ledger.lock().await;
                Some(Message::ChainResponse { ledger: ledger.to_json() })
            }
            Message::ChainResponse { ledger: candidate_json } => {
                self.adopt_if_longer_and_valid(candidate_json).await;
                None
            }
            Message::NewBlock { block } => {
                self.apply_new_block(block).await;
                None
            }
            Message::NewEntry { entry } => {
                self.ledger.lock().await.add_entry(entry);
                None
            }
            Message::RequestPeers => {
                let peers = self.known_peers().await;
                Some(Message::PeerList { peers })
            }
            Message::PeerList { peers } => {
                tracing::debug!(count = peers.len(), "received peer list");
                None
            }
        }
    }

    /// Adopts `candidate_json` only if it parses, passes `verifyChain`, and
    /// is strictly longer than the local chain.
    async fn adopt_if_longer_and_valid(&self, candidate_json: serde_json::Value) {
        let candidate = match Ledger::from_json(candidate_json) {
            Ok(ledger) => ledger,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed chain response");
                return;
            }
        };
        if candidate.verify_chain().is_err() {
            tracing::debug!("rejecting candidate chain that fails verification");
            return;
        }

        let mut local = self.ledger.lock().await;
        if candidate.block_count() > local.block_count() {
            tracing::info!(
                old_len = local.block_count(),
                new_len = candidate.block_count(),
                "adopting longer valid chain"
            );
            local.adopt_chain(candidate.blocks().to_vec());
        }
    }

    /// Appends a gossiped block only if it chains onto our current tip. In
    /// non-strict mode this trusts the sender's hashes as the documented
    /// (non-hardened) baseline behavior.
    async fn apply_new_block(&self, block: Block) {
        let mut ledger = self.ledger.lock().await;
        if block.previous_hash != ledger.latest_block().hash {
            tracing::debug!("dropping gossiped block that does not chain onto our tip");
            return;
        }

        if self.strict {
            if block.hash != block.recompute_hash() {
                tracing::warn!("strict mode rejected gossiped block: hash mismatch");
                return;
            }
            if block.merkle_root != Block::merkle_root_for(&block.entries) {
                tracing::warn!("strict mode rejected gossiped block: merkle root mismatch");
                return;
            }
            if block.entries.iter().any(|entry| !entry.hash_is_valid()) {
                tracing::warn!("strict mode rejected gossiped block: entry hash mismatch");
                return;
            }
        }

        ledger.adopt_block(block);
    }
}
