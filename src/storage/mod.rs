//! Pluggable persistence for ledger snapshots.
//!
//! A small trait at the boundary (`LedgerSnapshotStore`) and concrete
//! backends behind it — [`mem::InMemorySnapshotStore`] for tests and small
//! devnets, [`rocksdb::RocksDbSnapshotStore`] for a persistent node. What
//! gets stored is a whole-ledger canonical JSON snapshot rather than
//! individually hash-keyed blocks, since [`Ledger`] is a single
//! append-only sequence with wholesale replacement on replication, not a
//! hash-keyed multi-fork store.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemorySnapshotStore;
pub use rocksdb::RocksDbSnapshotStore;

use crate::error::StorageError;
use crate::ledger::Ledger;

/// Storage abstraction for persisting and reloading a ledger snapshot.
///
/// Implementations persist `Ledger::to_json()`'s canonical bytes under a
/// single logical slot; there is no versioning or multi-snapshot history,
/// just one current authoritative value, overwritten in place.
pub trait LedgerSnapshotStore {
    /// Persists `ledger`'s current state, overwriting any prior snapshot.
    fn save(&mut self, ledger: &Ledger) -> Result<(), StorageError>;

    /// Loads the most recently saved snapshot, if one exists.
    fn load(&self) -> Result<Option<Ledger>, StorageError>;
}
