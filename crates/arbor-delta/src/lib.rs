//! Delta engine for arbor.
//!
//! Revision archives store most revisions as deltas: an [`EditScript`] that
//! rebuilds a target byte sequence from a base byte sequence. Scripts are
//! computed line by line with the `similar` crate (Myers diff) and fall back
//! to a single literal insert when a line diff would not pay for itself,
//! which is what happens for most binary content.
//!
//! # Key Types
//!
//! - [`EditScript`] / [`EditOp`] -- copy-from-base and insert-literal ops
//! - [`compute_delta`] / [`apply_delta`] -- build and replay scripts
//! - [`unified_diff`] / [`diff_stat`] -- human-readable comparison of two revisions

pub mod error;
pub mod script;
pub mod text;

pub use error::{DeltaError, DeltaResult};
pub use script::{apply_delta, compute_delta, EditOp, EditScript};
pub use text::{diff_stat, unified_diff, DiffStat};
