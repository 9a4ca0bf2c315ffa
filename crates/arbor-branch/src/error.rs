//! Error types for branch operations.

use arbor_archive::ArchiveError;

/// Errors from the branch registry and branch views.
#[derive(Debug, thiserror::Error)]
pub enum BranchError {
    #[error("branch not found: {name}")]
    BranchNotFound { name: String },

    #[error("branch already exists: {name}")]
    BranchExists { name: String },

    #[error("invalid branch name {name:?}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// The requested parent cannot host a branch of this kind.
    #[error("branch {name} cannot be created under {parent}: {reason}")]
    InvalidParent {
        name: String,
        parent: String,
        reason: String,
    },

    /// The branch still has children or is the trunk.
    #[error("branch {name} cannot be removed: {reason}")]
    BranchInUse { name: String, reason: String },

    /// Mutation attempted through a read-only view.
    #[error("branch {branch} is read-only")]
    ReadOnly { branch: String },

    /// Nothing changed on the parent since the last resolve.
    #[error("branch {branch} is already resolved against its parent at {revision}")]
    AlreadyResolved { branch: String, revision: String },

    /// Check-in on a branch must extend the branch's visible tip.
    #[error("revision {revision} is not the tip of branch {branch} (tip is {tip})")]
    NotBranchTip {
        branch: String,
        revision: String,
        tip: String,
    },

    #[error("{operation} is not supported on branch {branch}")]
    NotSupported { operation: String, branch: String },

    /// User labels may not use the prefixes reserved for branch bookkeeping.
    #[error("label {label:?} uses a reserved prefix")]
    ReservedLabel { label: String },

    /// No revision of the file is visible on the branch.
    #[error("no revision visible on branch {branch}")]
    NothingVisible { branch: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("branch serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("branch registry lock poisoned")]
    LockPoisoned,
}

/// Result alias for branch operations.
pub type BranchResult<T> = Result<T, BranchError>;
