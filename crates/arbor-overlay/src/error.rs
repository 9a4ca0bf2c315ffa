//! Error types for namespace overlay operations.

use arbor_branch::BranchError;
use arbor_types::{DirectoryId, FileId};

/// Errors from the directory overlay and its tables.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("branch not found: {name}")]
    BranchNotFound { name: String },

    #[error("branch {branch} is read-only")]
    ReadOnly { branch: String },

    #[error("{operation} is not supported on branch {branch}")]
    NotSupported { operation: String, branch: String },

    #[error("file {file} is not present on branch {branch}")]
    FileNotFound { file: FileId, branch: String },

    #[error("file {file} is already present on branch {branch}")]
    FileExists { file: FileId, branch: String },

    #[error("directory {directory} is not present on branch {branch}")]
    DirectoryNotFound { directory: DirectoryId, branch: String },

    #[error("directory {directory} on branch {branch} is not empty")]
    DirectoryNotEmpty { directory: DirectoryId, branch: String },

    #[error("directory {directory} already exists")]
    DirectoryExists { directory: DirectoryId },

    #[error("no such path on branch {branch}: {path}")]
    PathNotFound { path: String, branch: String },

    /// The caller's idea of the file's current name is out of date.
    #[error("file {file} is named {actual:?}, not {expected:?}")]
    NameMismatch {
        file: FileId,
        expected: String,
        actual: String,
    },

    /// The caller's idea of the file's current directory is out of date.
    #[error("file {file} lives in directory {actual}, not {expected}")]
    DirectoryMismatch {
        file: FileId,
        expected: DirectoryId,
        actual: DirectoryId,
    },

    #[error("name {name:?} is already taken in directory {directory}")]
    NameConflict { directory: DirectoryId, name: String },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("file {file} is not in the cemetery on branch {branch}")]
    NotInCemetery { file: FileId, branch: String },

    /// The branch has no local change to the file.
    #[error("file {file} has no pending change on branch {branch}")]
    NothingToPromote { file: FileId, branch: String },

    #[error("{kind} identifiers exhausted")]
    IdsExhausted { kind: &'static str },

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error("namespace serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("namespace store lock poisoned")]
    LockPoisoned,
}

impl OverlayError {
    /// Map a registry lookup failure, keeping `BranchNotFound` at this level.
    pub(crate) fn from_lookup(err: BranchError) -> Self {
        match err {
            BranchError::BranchNotFound { name } => OverlayError::BranchNotFound { name },
            other => OverlayError::Branch(other),
        }
    }
}

/// Result alias for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;
