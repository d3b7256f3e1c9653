//! Store error types.

use thiserror::Error;

use super::ClientId;

/// Errors that can occur during store operations.
///
/// The store never encodes protocol-specific formats; front ends translate
/// via [`crate::errmap`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Path or resource does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested lock is held by another client.
    #[error("lock held by {holder}")]
    AlreadyLocked { holder: ClientId },

    /// Caller does not hold the lock the operation requires (the candidate
    /// lock for edits, commit and discard; the addressed lock for unlock).
    #[error("client {0} does not hold the required lock")]
    NoCandidateLock(ClientId),

    /// Malformed or type-invalid edit.
    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    /// `create` of an entry that already exists.
    #[error("data exists: {0}")]
    DataExists(String),

    /// Create/update references an entity that does not exist.
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Delete of an entity still referenced by another.
    #[error("reference conflict: {0}")]
    ReferenceConflict(String),

    /// Running changed since the candidate was last synchronized.
    #[error("commit conflict: running is at version {running}, candidate based on {base}")]
    CommitConflict { base: u64, running: u64 },

    /// The datastore has been stopped.
    #[error("datastore unavailable")]
    Unavailable,
}

/// Discriminant of [`StoreError`], keyed into the wire mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyLocked,
    NoCandidateLock,
    InvalidEdit,
    DataExists,
    DanglingReference,
    ReferenceConflict,
    CommitConflict,
    Unavailable,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyLocked { .. } => ErrorKind::AlreadyLocked,
            StoreError::NoCandidateLock(_) => ErrorKind::NoCandidateLock,
            StoreError::InvalidEdit(_) => ErrorKind::InvalidEdit,
            StoreError::DataExists(_) => ErrorKind::DataExists,
            StoreError::DanglingReference(_) => ErrorKind::DanglingReference,
            StoreError::ReferenceConflict(_) => ErrorKind::ReferenceConflict,
            StoreError::CommitConflict { .. } => ErrorKind::CommitConflict,
            StoreError::Unavailable => ErrorKind::Unavailable,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
