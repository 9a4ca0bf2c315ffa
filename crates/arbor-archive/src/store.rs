use crate::error::{ArchiveError, ArchiveResult};

/// Durable key-value storage for encoded archives.
///
/// Keys are relative, `/`-separated paths such as `src/main.rs,v`. All
/// implementations must satisfy these invariants:
/// - `write` replaces the stored bytes atomically: a concurrent or later
///   reader sees either the old archive or the new one, never a mix.
/// - `create` never overwrites.
/// - The store never interprets archive contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ArchiveStore: Send + Sync {
    /// Read the archive stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    fn read(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>>;

    /// Atomically replace (or create) the archive stored under `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()>;

    /// Store a new archive. Fails with `AlreadyExists` if `key` is taken.
    fn create(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()>;

    /// Check whether an archive is stored under `key`.
    fn exists(&self, key: &str) -> ArchiveResult<bool>;

    /// Remove the archive under `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> ArchiveResult<bool>;

    /// All stored keys, sorted.
    fn keys(&self) -> ArchiveResult<Vec<String>>;

    /// Stored length of the archive under `key`.
    ///
    /// Default implementation reads the whole archive.
    fn stored_len(&self, key: &str) -> ArchiveResult<Option<u64>> {
        Ok(self.read(key)?.map(|bytes| bytes.len() as u64))
    }
}

/// Validate an archive key.
pub fn validate_key(key: &str) -> ArchiveResult<()> {
    let invalid = |reason: &str| ArchiveError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid("contains a forbidden character"));
    }
    for component in key.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty"));
        }
        if component == "." || component == ".." {
            return Err(invalid("relative components are not allowed"));
        }
        if component.starts_with(".tmp") {
            return Err(invalid("reserved for staging files"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_keys() {
        assert!(validate_key("a.txt,v").is_ok());
        assert!(validate_key("src/lib/a.rs,v").is_ok());
    }

    #[test]
    fn rejects_escapes() {
        for key in ["", "/abs", "dir/", "a//b", "../up", "a/./b", "win\\path", "dir/.tmpXYZ"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
    }
}
