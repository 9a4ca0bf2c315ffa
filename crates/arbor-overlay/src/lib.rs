//! Per-branch directory namespace for arbor.
//!
//! Archives are shared by every branch; names are not. The overlay records,
//! per branch, where each file lives and what it is called, keyed by the
//! file's stable [`FileId`](arbor_types::FileId). A branch stores only the
//! rows it changed and inherits the rest from its parent. Deleting a file
//! parks it in the cemetery under a name derived from its id, so it can be
//! restored later with its identity and history intact.
//!
//! Every change runs inside a [`Transaction`] that holds the namespace
//! exclusively and publishes its writes at once on commit.
//!
//! # Key Types
//!
//! - [`DirectoryOverlay`] -- namespace operations for every branch of a project
//! - [`OverlayTransaction`] -- several namespace changes applied atomically
//! - [`NamespaceTables`] / [`InMemoryTables`] -- the CRUD contract and its in-memory tables
//! - [`NamespaceStore`] / [`Transaction`] -- shared reads, staged exclusive writes
//! - [`Namespace`] -- one branch's resolved view of the tables
//! - [`DirectoryContents`] / [`FileIdInfo`] -- directory listings and the file-id dictionary
//! - [`PromotionCandidate`] -- branch changes that can be carried to the parent

pub mod alloc;
pub mod error;
pub mod namespace;
pub mod overlay;
pub mod promotion;
pub mod records;
pub mod store;
pub mod tables;

pub use alloc::{DirectoryIdAllocator, FileIdAllocator, IdAllocator, SequentialIds};
pub use arbor_archive::{cemetery_name, parse_cemetery_name};
pub use error::{OverlayError, OverlayResult};
pub use namespace::Namespace;
pub use overlay::{validate_name, DirectoryOverlay, OverlayTransaction, CEMETERY_DIRECTORY, MAX_NAME_LEN, ROOT_DIRECTORY};
pub use promotion::{PromotionCandidate, PromotionKind};
pub use records::{DirectoryContents, DirectoryRecord, FileIdInfo, FileRecord, Versioned};
pub use store::{NamespaceStore, Transaction};
pub use tables::{InMemoryTables, NamespaceTables, TablesDump};
