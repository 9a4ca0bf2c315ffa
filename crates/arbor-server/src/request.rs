use arbor_archive::{ArchiveAttributes, CheckInOptions, LabelArgs, LogfileInfo, RevisionSelector};
use arbor_overlay::{DirectoryContents, FileIdInfo};
use arbor_types::{FileId, RevisionNumber};

/// Archive metadata a [`Request::SetMetadata`] changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataChange {
    Attributes(ArchiveAttributes),
    CommentPrefix(String),
    ModuleDescription(String),
    RevisionDescription { revision: String, description: String },
    Obsolete(bool),
}

/// A client request. Paths are project-relative and `/`-separated, as the
/// file is named on `branch`.
#[derive(Clone, Debug)]
pub enum Request {
    Create {
        branch: String,
        path: String,
        content: Vec<u8>,
        description: Option<String>,
        attributes: Option<ArchiveAttributes>,
    },
    Get { branch: String, path: String, selector: RevisionSelector },
    CheckOut { branch: String, path: String, revision: Option<String>, comment: String },
    CheckIn {
        branch: String,
        path: String,
        locked_revision: String,
        content: Vec<u8>,
        description: String,
        options: CheckInOptions,
    },
    Lock { branch: String, path: String, revision: Option<String> },
    Unlock { branch: String, path: String, revision: String },
    BreakLock { branch: String, path: String, revision: String },
    Label { branch: String, path: String, args: LabelArgs },
    Unlabel { branch: String, path: String, label: String },
    SetMetadata { branch: String, path: String, change: MetadataChange },
    /// Move the file into the directory at `destination`.
    Move { branch: String, path: String, destination: String },
    Rename { branch: String, path: String, new_name: String },
    Delete { branch: String, path: String },
    /// Bring a deleted file back to `path`.
    Undelete { branch: String, file_id: FileId, path: String },
    Report { branch: String, path: String },
    Resolve { branch: String, path: String },
    List { branch: String, directory: String },
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "Create",
            Self::Get { .. } => "Get",
            Self::CheckOut { .. } => "CheckOut",
            Self::CheckIn { .. } => "CheckIn",
            Self::Lock { .. } => "Lock",
            Self::Unlock { .. } => "Unlock",
            Self::BreakLock { .. } => "BreakLock",
            Self::Label { .. } => "Label",
            Self::Unlabel { .. } => "Unlabel",
            Self::SetMetadata { .. } => "SetMetadata",
            Self::Move { .. } => "Move",
            Self::Rename { .. } => "Rename",
            Self::Delete { .. } => "Delete",
            Self::Undelete { .. } => "Undelete",
            Self::Report { .. } => "Report",
            Self::Resolve { .. } => "Resolve",
            Self::List { .. } => "List",
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            Self::Create { branch, .. }
            | Self::Get { branch, .. }
            | Self::CheckOut { branch, .. }
            | Self::CheckIn { branch, .. }
            | Self::Lock { branch, .. }
            | Self::Unlock { branch, .. }
            | Self::BreakLock { branch, .. }
            | Self::Label { branch, .. }
            | Self::Unlabel { branch, .. }
            | Self::SetMetadata { branch, .. }
            | Self::Move { branch, .. }
            | Self::Rename { branch, .. }
            | Self::Delete { branch, .. }
            | Self::Undelete { branch, .. }
            | Self::Report { branch, .. }
            | Self::Resolve { branch, .. }
            | Self::List { branch, .. } => branch,
        }
    }

    /// The path the request is about.
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. }
            | Self::Get { path, .. }
            | Self::CheckOut { path, .. }
            | Self::CheckIn { path, .. }
            | Self::Lock { path, .. }
            | Self::Unlock { path, .. }
            | Self::BreakLock { path, .. }
            | Self::Label { path, .. }
            | Self::Unlabel { path, .. }
            | Self::SetMetadata { path, .. }
            | Self::Move { path, .. }
            | Self::Rename { path, .. }
            | Self::Delete { path, .. }
            | Self::Undelete { path, .. }
            | Self::Report { path, .. }
            | Self::Resolve { path, .. } => path,
            Self::List { directory, .. } => directory,
        }
    }

    /// Whether the request changes anything.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get { .. } | Self::Report { .. } | Self::List { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Created { file_id: FileId, revision: RevisionNumber },
    Content { revision: RevisionNumber, content: Vec<u8> },
    CheckedOut { revision: RevisionNumber, content: Vec<u8> },
    /// `created` is `false` when the content matched and no revision was added.
    CheckedIn { revision: RevisionNumber, created: bool },
    Locked { revision: RevisionNumber },
    Unlocked,
    LockBroken { holder: String },
    /// Label, unlabel and metadata changes. `false` when nothing changed.
    Applied(bool),
    /// Namespace change; `bookkeeping` counts revisions added to the archive.
    Relocated { info: FileIdInfo, bookkeeping: usize },
    Report(Box<LogfileInfo>),
    Resolved { anchor: RevisionNumber },
    Listing(DirectoryContents),
}

impl Response {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Created",
            Self::Content { .. } => "Content",
            Self::CheckedOut { .. } => "CheckedOut",
            Self::CheckedIn { .. } => "CheckedIn",
            Self::Locked { .. } => "Locked",
            Self::Unlocked => "Unlocked",
            Self::LockBroken { .. } => "LockBroken",
            Self::Applied(_) => "Applied",
            Self::Relocated { .. } => "Relocated",
            Self::Report(_) => "Report",
            Self::Resolved { .. } => "Resolved",
            Self::Listing(_) => "Listing",
        }
    }
}
