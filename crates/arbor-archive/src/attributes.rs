use serde::{Deserialize, Serialize};

/// Archive-level attribute flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveAttributes {
    /// A user must hold the lock on a revision before checking in against it.
    pub check_lock: bool,
    /// At most one user may hold locks in the archive at a time.
    pub exclusive_lock: bool,
    /// Keyword expansion applies to this file's content.
    pub expand_keywords: bool,
    /// Content is binary: no keyword expansion, every revision stored in full.
    pub binary: bool,
    /// Store non-tip revisions as deltas.
    pub compute_delta: bool,
    /// Compress stored payloads when that makes them smaller.
    pub compress: bool,
    /// Workfiles are made read-only when not locked.
    pub protect_workfile: bool,
    /// Workfiles are removed after a check-in.
    pub delete_workfile: bool,
}

impl Default for ArchiveAttributes {
    fn default() -> Self {
        Self {
            check_lock: true,
            exclusive_lock: false,
            expand_keywords: false,
            binary: false,
            compute_delta: true,
            compress: true,
            protect_workfile: true,
            delete_workfile: false,
        }
    }
}

impl ArchiveAttributes {
    /// Attributes for a binary file.
    pub fn binary() -> Self {
        Self {
            binary: true,
            compute_delta: false,
            ..Self::default()
        }
    }

    pub fn stores_deltas(&self) -> bool {
        self.compute_delta && !self.binary
    }

    pub fn expands_keywords(&self) -> bool {
        self.expand_keywords && !self.binary
    }

    /// Names of the flags that are set, for reports.
    pub fn flag_names(&self) -> Vec<&'static str> {
        [
            (self.check_lock, "check-lock"),
            (self.exclusive_lock, "exclusive-lock"),
            (self.expand_keywords, "expand-keywords"),
            (self.binary, "binary"),
            (self.compute_delta, "compute-delta"),
            (self.compress, "compress"),
            (self.protect_workfile, "protect-workfile"),
            (self.delete_workfile, "delete-workfile"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_disables_deltas_and_keywords() {
        let mut attrs = ArchiveAttributes::binary();
        attrs.expand_keywords = true;
        assert!(!attrs.stores_deltas());
        assert!(!attrs.expands_keywords());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let attrs: ArchiveAttributes = toml::from_str("expand_keywords = true").unwrap();
        assert!(attrs.expand_keywords);
        assert!(attrs.check_lock);
        assert!(attrs.compute_delta);
    }

    #[test]
    fn flag_names_lists_set_flags() {
        let names = ArchiveAttributes::default().flag_names();
        assert!(names.contains(&"check-lock"));
        assert!(!names.contains(&"binary"));
    }
}
