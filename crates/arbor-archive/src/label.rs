//! Labels: named pointers to revisions.
//!
//! A fixed label stores a full revision number and never moves. A floating
//! label stores the *line* it was applied on (`1` for the trunk, `1.2.1` for
//! a branch) and always resolves to that line's current tip.
//!
//! Valid label names:
//! - Must be non-empty and at most [`MAX_LABEL_LEN`] bytes
//! - Must not contain `$` (keyword delimiter) or control characters
//! - Must not start or end with whitespace

use serde::{Deserialize, Serialize};

use arbor_types::RevisionNumber;

use crate::error::{ArchiveError, ArchiveResult};

pub const MAX_LABEL_LEN: usize = 255;

/// A label stored in an archive header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Revision number for fixed labels, line for floating ones.
    pub target: String,
    pub floating: bool,
}

impl Label {
    pub fn fixed(name: impl Into<String>, revision: &RevisionNumber) -> Self {
        Self {
            name: name.into(),
            target: revision.to_string(),
            floating: false,
        }
    }

    pub fn floating(name: impl Into<String>, revision: &RevisionNumber) -> Self {
        Self {
            name: name.into(),
            target: revision.line_string(),
            floating: true,
        }
    }

    /// Line components of a floating label's target.
    pub(crate) fn line(&self) -> Option<Vec<u32>> {
        self.target
            .split('.')
            .map(|part| part.parse::<u32>().ok())
            .collect()
    }
}

/// Validate a label name, returning `Ok(())` if valid.
pub fn validate_label_name(name: &str) -> ArchiveResult<()> {
    let invalid = |reason: &str| ArchiveError::InvalidLabel {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("label name must not be empty"));
    }
    if name.len() > MAX_LABEL_LEN {
        return Err(invalid("label name too long"));
    }
    if name.contains('$') {
        return Err(invalid("must not contain '$'"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("must not contain control characters"));
    }
    if name.trim() != name {
        return Err(invalid("must not start or end with whitespace"));
    }
    Ok(())
}
