//! In-memory ledger snapshot store.
//!
//! Useful for unit tests, benchmarks, and embedders that deliberately run
//! without durable persistence (e.g. an ephemeral devnet node).

use super::LedgerSnapshotStore;
use crate::error::StorageError;
use crate::ledger::Ledger;

/// Holds at most one snapshot, as canonical JSON bytes, in a `Vec<u8>`.
///
/// Storing the encoded bytes rather than a cloned `Ledger` keeps this
/// backend exercising the same encode/decode path the RocksDB backend
/// does, so a round trip through either store is equivalent.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    bytes: Option<Vec<u8>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        InMemorySnapshotStore::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_none()
    }
}

impl LedgerSnapshotStore for InMemorySnapshotStore {
    fn save(&mut self, ledger: &Ledger) -> Result<(), StorageError> {
        self.bytes = Some(serde_json::to_vec(&ledger.to_json())?);
        Ok(())
    }

    fn load(&self) -> Result<Option<Ledger>, StorageError> {
        let Some(bytes) = &self.bytes else { return Ok(None) };
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let ledger = Ledger::from_json(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        Ok(Some(ledger))
    }
}
