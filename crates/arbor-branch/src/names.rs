//! Branch names and the archive labels derived from them.
//!
//! Valid branch names:
//! - Must be non-empty and at most [`MAX_BRANCH_NAME_LEN`] bytes
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`, `$`
//! - Must not contain `..`
//! - Must not start or end with `.` or `/`

use crate::error::{BranchError, BranchResult};

pub const MAX_BRANCH_NAME_LEN: usize = 128;

/// Prefix of the floating label tracking a branch's newest local revision.
pub const TRACKING_LABEL_PREFIX: &str = "branch:";

/// Prefix of the fixed label recording where a branch was last resolved
/// against its parent.
pub const ANCHOR_LABEL_PREFIX: &str = "anchor:";

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\', '$'];

pub fn validate_branch_name(name: &str) -> BranchResult<()> {
    let invalid = |reason: &str| BranchError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("branch name must not be empty"));
    }
    if name.len() > MAX_BRANCH_NAME_LEN {
        return Err(invalid("branch name is too long"));
    }
    if let Some(ch) = name.chars().find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c)) {
        return Err(BranchError::InvalidBranchName {
            name: name.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid("must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    Ok(())
}

pub fn tracking_label(branch: &str) -> String {
    format!("{TRACKING_LABEL_PREFIX}{branch}")
}

pub fn anchor_label(branch: &str) -> String {
    format!("{ANCHOR_LABEL_PREFIX}{branch}")
}

/// Returns `true` for labels only the branch layer may set.
pub fn is_reserved_label(label: &str) -> bool {
    label.starts_with(TRACKING_LABEL_PREFIX) || label.starts_with(ANCHOR_LABEL_PREFIX)
}

pub(crate) fn ensure_user_label(label: &str) -> BranchResult<()> {
    if is_reserved_label(label) {
        return Err(BranchError::ReservedLabel {
            label: label.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["Trunk", "release-2.1", "feature/login", "a"] {
            assert!(validate_branch_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "has space", "a:b", "a..b", ".hidden", "trail.", "/lead", "end/", "x$y", "tab\t"] {
            assert!(validate_branch_name(name).is_err(), "{name:?}");
        }
        assert!(validate_branch_name(&"x".repeat(MAX_BRANCH_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn derived_labels_are_reserved() {
        assert_eq!(tracking_label("dev"), "branch:dev");
        assert_eq!(anchor_label("dev"), "anchor:dev");
        assert!(is_reserved_label(&tracking_label("dev")));
        assert!(is_reserved_label(&anchor_label("dev")));
        assert!(!is_reserved_label("REL_1_0"));
        assert!(matches!(ensure_user_label("branch:x"), Err(BranchError::ReservedLabel { .. })));
    }
}
