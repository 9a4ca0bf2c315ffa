//! Human-readable comparison of two revisions.
//!
//! Used for visual compare and the CLI `diff` command; never for storage.

use similar::{ChangeTag, TextDiff};

/// Line counts of a comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub added: usize,
    pub removed: usize,
    /// `true` when either side is not UTF-8 and no line view exists.
    pub binary: bool,
}

impl DiffStat {
    pub fn is_empty(&self) -> bool {
        !self.binary && self.added == 0 && self.removed == 0
    }
}

/// Count added and removed lines between `old` and `new`.
pub fn diff_stat(old: &[u8], new: &[u8]) -> DiffStat {
    let (Ok(old_str), Ok(new_str)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        return DiffStat {
            binary: old != new,
            ..DiffStat::default()
        };
    };

    let diff = TextDiff::from_lines(old_str, new_str);
    let mut stat = DiffStat::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stat.added += 1,
            ChangeTag::Delete => stat.removed += 1,
            ChangeTag::Equal => {}
        }
    }
    stat
}

/// Render a unified diff with three lines of context.
///
/// Returns `None` for binary content, and an empty string when the two
/// sides are identical.
pub fn unified_diff(old: &[u8], new: &[u8], old_label: &str, new_label: &str) -> Option<String> {
    let old_str = std::str::from_utf8(old).ok()?;
    let new_str = std::str::from_utf8(new).ok()?;
    if old_str == new_str {
        return Some(String::new());
    }
    let diff = TextDiff::from_lines(old_str, new_str);
    Some(
        diff.unified_diff()
            .context_radius(3)
            .header(old_label, new_label)
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_added_and_removed_lines() {
        let stat = diff_stat(b"a\nb\nc\n", b"a\nB\nc\nd\n");
        assert_eq!(stat.added, 2);
        assert_eq!(stat.removed, 1);
        assert!(!stat.binary);
    }

    #[test]
    fn identical_is_empty() {
        assert!(diff_stat(b"same\n", b"same\n").is_empty());
        assert_eq!(unified_diff(b"same\n", b"same\n", "a", "b").unwrap(), "");
    }

    #[test]
    fn binary_has_no_line_view() {
        let stat = diff_stat(&[0xff, 0xfe], &[0xff]);
        assert!(stat.binary);
        assert!(unified_diff(&[0xff, 0xfe], &[0xff], "a", "b").is_none());
    }

    #[test]
    fn unified_output_has_headers() {
        let text = unified_diff(b"one\ntwo\n", b"one\n2\n", "1.1", "1.2").unwrap();
        assert!(text.starts_with("--- 1.1\n+++ 1.2\n"));
        assert!(text.contains("-two\n"));
        assert!(text.contains("+2\n"));
    }
}
