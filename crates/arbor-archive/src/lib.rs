//! Revision archives for arbor.
//!
//! One archive holds the complete history of one file: a tree of revisions
//! numbered RCS style, the locks held on them, labels, and archive-wide
//! attributes. Archives are persisted through an [`ArchiveStore`] and every
//! mutation is staged, integrity checked, and written atomically before it
//! becomes visible.
//!
//! # Key Types
//!
//! - [`RevisionArchive`] -- in-memory revision tree with all archive operations
//! - [`ArchiveFile`] -- one archive bound to its storage key, all-or-nothing updates
//! - [`ArchiveRepository`] -- create/open/rename/move/delete archives of a project
//! - [`ArchiveStore`] -- durable storage trait ([`InMemoryArchiveStore`], [`FsArchiveStore`])
//! - [`LogfileInfo`] -- metadata snapshot reported to clients

pub mod archive;
pub mod attributes;
pub mod cemetery;
pub mod codec;
pub mod error;
pub mod file;
pub mod fs;
pub mod info;
pub mod label;
pub mod memory;
pub mod node;
pub mod repository;
pub mod store;

pub use archive::{
    ArchiveHeader, CheckInOptions, CheckInOutcome, CheckOut, CreateArchive, LabelArgs, RevisionArchive,
    RevisionSelector, INTERNAL_REVISION_PREFIX, MULTIPLE_LABELS,
};
pub use attributes::ArchiveAttributes;
pub use cemetery::{cemetery_name, parse_cemetery_name};
pub use error::{ArchiveError, ArchiveResult};
pub use file::ArchiveFile;
pub use fs::FsArchiveStore;
pub use info::{LabelInfo, LogfileInfo, RevisionInfo};
pub use label::{validate_label_name, Label, MAX_LABEL_LEN};
pub use memory::InMemoryArchiveStore;
pub use node::{LockRecord, RevisionNode, Storage};
pub use repository::{archive_key, workfile_path, ArchiveRepository, ARCHIVE_SUFFIX, DEFAULT_CEMETERY_DIR};
pub use store::{validate_key, ArchiveStore};
