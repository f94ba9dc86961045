//! Shared error taxonomy used across every component.
//!
//! Every mutating operation in this crate returns `Result<T, GovError>`.
//! There is a single error enum rather than one per component because the
//! taxonomy itself is shared: components disagree on *when* each kind
//! applies, not on what the kinds are.

use std::fmt;

/// Errors surfaced by ledger, registry, and audit operations.
#[derive(Debug)]
pub enum GovError {
    /// An id (identity, proposal, petition, entry, session) is unknown.
    NotFound(String),
    /// A repeat registration, commitment, or signature was attempted.
    Duplicate(String),
    /// The operation is not valid for the current state/phase.
    State(String),
    /// Signer revoked, untrusted, or a signature/commitment failed to verify.
    Auth(String),
    /// A required field was missing, empty, or malformed.
    Validation(String),
    /// Chain verification failed at a specific block index.
    Integrity { reason: String, block_index: Option<u64> },
}

impl fmt::Display for GovError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovError::NotFound(msg) => write!(f, "not found: {msg}"),
            GovError::Duplicate(msg) => write!(f, "duplicate: {msg}"),
            GovError::State(msg) => write!(f, "invalid state transition: {msg}"),
            GovError::Auth(msg) => write!(f, "authentication error: {msg}"),
            GovError::Validation(msg) => write!(f, "validation error: {msg}"),
            GovError::Integrity { reason, block_index: Some(i) } => {
                write!(f, "integrity error at block {i}: {reason}")
            }
            GovError::Integrity { reason, block_index: None } => {
                write!(f, "integrity error: {reason}")
            }
        }
    }
}

impl std::error::Error for GovError {}

impl GovError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        GovError::NotFound(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        GovError::Duplicate(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        GovError::State(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        GovError::Auth(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GovError::Validation(msg.into())
    }

    pub fn integrity(reason: impl Into<String>, block_index: Option<u64>) -> Self {
        GovError::Integrity { reason: reason.into(), block_index }
    }
}

/// Storage-level error type for pluggable ledger snapshot backends.
///
/// Kept distinct from [`GovError`]: storage failures are an
/// infrastructure concern, not a domain-rule violation.
#[derive(Debug)]
pub enum StorageError {
    Io(String),
    Serde(String),
    RocksDb(rocksdb::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "storage io error: {msg}"),
            StorageError::Serde(msg) => write!(f, "storage encoding error: {msg}"),
            StorageError::RocksDb(e) => write!(f, "rocksdb error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e.to_string())
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::RocksDb(e)
    }
}
