use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("permission denied: {user} may not {action}")]
    PermissionDenied { user: String, action: String },

    #[error("no file at {path} on branch {branch}")]
    FileNotFound { branch: String, path: String },

    /// The namespace names a file whose archive cannot be located.
    #[error("archive for file {file_id} is missing")]
    ArchiveMissing { file_id: arbor_types::FileId },

    #[error("archive error: {0}")]
    Archive(#[from] arbor_archive::ArchiveError),

    #[error("branch error: {0}")]
    Branch(#[from] arbor_branch::BranchError),

    #[error("namespace error: {0}")]
    Overlay(#[from] arbor_overlay::OverlayError),

    #[error("keyword error: {0}")]
    Keyword(#[from] arbor_keywords::KeywordError),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// `true` when the stored data behind the request can no longer be
    /// trusted, as opposed to a rejected request.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Archive(e) => e.is_fatal(),
            Self::Branch(arbor_branch::BranchError::Archive(e)) => e.is_fatal(),
            Self::ArchiveMissing { .. } | Self::Serialization(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_requests_are_not_fatal() {
        let denied = ServerError::PermissionDenied {
            user: "bob".into(),
            action: "write:trunk:a.c".into(),
        };
        assert!(!denied.is_fatal());
        assert_eq!(denied.to_string(), "permission denied: bob may not write:trunk:a.c");

        let locked = ServerError::from(arbor_archive::ArchiveError::AlreadyLocked {
            revision: "1.1".into(),
            holder: "alice".into(),
        });
        assert!(!locked.is_fatal());
    }

    #[test]
    fn corruption_is_fatal() {
        let corrupt = ServerError::from(arbor_archive::ArchiveError::Corrupt { reason: "crc".into() });
        assert!(corrupt.is_fatal());
        let nested = ServerError::from(arbor_branch::BranchError::Archive(arbor_archive::ArchiveError::Corrupt {
            reason: "crc".into(),
        }));
        assert!(nested.is_fatal());
    }
}
