//! RocksDB-backed ledger snapshot store.
//!
//! Persists the ledger's canonical JSON bytes under a single fixed key in
//! a dedicated column family: one CF for payload, a fixed key standing in
//! for a "current tip" pointer — here there is only ever one snapshot, so
//! there is no separate meta CF to track a pointer into.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use super::LedgerSnapshotStore;
use crate::error::StorageError;
use crate::ledger::Ledger;

const CF_SNAPSHOT: &str = "snapshot";
const SNAPSHOT_KEY: &[u8] = b"ledger";

/// Configuration for [`RocksDbSnapshotStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        RocksDbConfig { path: "data/govchain-db".to_string(), create_if_missing: true }
    }
}

/// RocksDB-backed implementation of [`LedgerSnapshotStore`].
pub struct RocksDbSnapshotStore {
    db: DB,
}

impl RocksDbSnapshotStore {
    /// Opens (or creates) a RocksDB-backed snapshot store at the given path.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_SNAPSHOT, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(RocksDbSnapshotStore { db })
    }

    fn cf_snapshot(&self) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>, StorageError> {
        self.db.cf_handle(CF_SNAPSHOT).ok_or_else(|| StorageError::Io(format!("missing column family: {CF_SNAPSHOT}")))
    }
}

impl LedgerSnapshotStore for RocksDbSnapshotStore {
    fn save(&mut self, ledger: &Ledger) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&ledger.to_json())?;
        let cf = self.cf_snapshot()?;
        self.db.put_cf(&cf, SNAPSHOT_KEY, bytes)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Ledger>, StorageError> {
        let cf = self.cf_snapshot()?;
        let Some(bytes) = self.db.get_cf(&cf, SNAPSHOT_KEY)? else { return Ok(None) };
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let ledger = Ledger::from_json(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        Ok(Some(ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EntryType, LedgerEntry};
    use tempfile::TempDir;

    #[test]
    fn rocksdb_store_round_trips_a_committed_snapshot() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig { path: tmp.path().to_string_lossy().to_string(), create_if_missing: true };

        let mut ledger = Ledger::new(0, 1);
        ledger.add_entry(LedgerEntry::new_system(EntryType::Register, serde_json::json!({"a": 1}), 1));
        ledger.commit_block(2).unwrap();

        let mut store = RocksDbSnapshotStore::open(&cfg).expect("open rocksdb");
        store.save(&ledger).unwrap();

        let restored = store.load().unwrap().expect("snapshot should be present");
        assert_eq!(restored.block_count(), 2);
        assert!(restored.verify_chain().is_ok());
    }

    #[test]
    fn fresh_database_has_no_snapshot() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig { path: tmp.path().to_string_lossy().to_string(), create_if_missing: true };
        let store = RocksDbSnapshotStore::open(&cfg).expect("open rocksdb");
        assert!(store.load().unwrap().is_none());
    }
}
