//! Error types for revision archive operations.

use arbor_delta::DeltaError;
use arbor_types::TypeError;

/// Errors from archive operations.
///
/// Expected negative outcomes (applying a label to a revision that does not
/// exist, removing a label that is already gone) are reported as `Ok(false)`
/// by the operations themselves; everything here is a real failure.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The backing store already holds an archive under this key.
    #[error("archive already exists: {key}")]
    AlreadyExists { key: String },

    /// No archive is stored under this key.
    #[error("archive not found: {key}")]
    NotFound { key: String },

    /// The archive failed an integrity check. Fatal for the request.
    #[error("archive corrupt: {reason}")]
    Corrupt { reason: String },

    /// The revision is locked by somebody else.
    #[error("revision {revision} is already locked by {holder}")]
    AlreadyLocked { revision: String, holder: String },

    /// The caller does not hold the lock the operation needs.
    #[error("revision {revision} is not locked by {user}")]
    NotLocked { revision: String, user: String },

    /// The caller's input-file timestamp predates the archive's last update.
    #[error("stale timestamp: input is from {supplied}, archive last updated {last_update}")]
    StaleTimestamp { supplied: String, last_update: String },

    #[error("label not found: {label}")]
    LabelNotFound { label: String },

    #[error("label already exists: {label}")]
    DuplicateLabel { label: String },

    #[error("revision not found: {revision}")]
    RevisionNotFound { revision: String },

    #[error("invalid label name {name:?}: {reason}")]
    InvalidLabel { name: String, reason: String },

    #[error("invalid archive key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The archive's recorded workfile name is not the one the caller expected.
    #[error("workfile name mismatch: archive is {actual:?}, caller expected {expected:?}")]
    WorkfileNameMismatch { expected: String, actual: String },

    #[error(transparent)]
    InvalidRevision(#[from] TypeError),

    /// A stored delta could not be replayed.
    #[error("delta replay failed: {0}")]
    Delta(#[from] DeltaError),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive lock poisoned")]
    LockPoisoned,
}

impl ArchiveError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that mean the stored archive can no longer
    /// be trusted, as opposed to a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::Delta(_) | Self::Io(_) | Self::LockPoisoned
        )
    }
}

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
