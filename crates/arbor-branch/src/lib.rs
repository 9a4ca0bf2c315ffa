//! Branches for arbor.
//!
//! A branch never copies archives. Every branch of a project shares the same
//! per-file revision trees; a [`BranchView`] decides which revision of a tree
//! is visible on a branch and routes mutations accordingly. Writable
//! branches keep their own revisions on a dedicated revision line tracked by
//! a floating `branch:<name>` label. Date-based branches are read-only
//! snapshots of their parent.
//!
//! # Key Types
//!
//! - [`BranchRegistry`] / [`Branch`] / [`BranchKind`] -- the project's branches
//! - [`BranchView`] -- archive operations as seen from one branch
//! - [`WritableBranchView`] -- trunk, feature, translucent and opaque branches
//! - [`DateBasedView`] -- read-only view frozen at a date
//! - [`open_view`] -- pick the right view for a branch

pub mod date_based;
pub mod error;
pub mod names;
pub mod registry;
pub mod tip;
pub mod view;
pub mod writable;

pub use date_based::DateBasedView;
pub use error::{BranchError, BranchResult};
pub use names::{anchor_label, is_reserved_label, tracking_label, validate_branch_name};
pub use registry::{Branch, BranchKind, BranchRegistry, TRUNK_NAME};
pub use tip::visible_tip;
pub use view::{open_view, BranchView};
pub use writable::WritableBranchView;
