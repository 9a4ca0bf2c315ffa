//! Foundation types for arbor, a server-resident revision-control engine.
//!
//! Every other arbor crate depends on `arbor-types`. Nothing in here touches
//! storage; these are plain values with total orderings and stable
//! serialized forms.
//!
//! # Key Types
//!
//! - [`FileId`] / [`DirectoryId`] -- stable identities that survive renames,
//!   moves and branching
//! - [`BranchId`] -- identity of a branch within one project
//! - [`RevisionNumber`] -- RCS-style dotted revision number (`1.7`, `1.7.1.3`)
//! - [`Timestamp`] -- millisecond wall-clock instant
//! - [`ContentDigest`] -- BLAKE3 digest of reconstructed revision content

pub mod digest;
pub mod error;
pub mod ids;
pub mod revision;
pub mod temporal;

pub use digest::ContentDigest;
pub use error::TypeError;
pub use ids::{BranchId, DirectoryId, FileId};
pub use revision::RevisionNumber;
pub use temporal::Timestamp;
