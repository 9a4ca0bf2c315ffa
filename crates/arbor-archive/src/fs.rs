use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ArchiveError, ArchiveResult};
use crate::store::{validate_key, ArchiveStore};

/// Filesystem archive store rooted at a directory.
///
/// Each archive is one file at `root/<key>`. Writes go to a staging file in
/// the same directory which is then renamed over the target, so a crash
/// leaves either the old archive or the new one.
#[derive(Debug)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> ArchiveResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    fn stage(&self, path: &Path, bytes: &[u8]) -> ArchiveResult<NamedTempFile> {
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        let mut staging = NamedTempFile::new_in(parent)?;
        staging.write_all(bytes)?;
        staging.as_file().sync_all()?;
        Ok(staging)
    }
}

impl ArchiveStore for FsArchiveStore {
    fn read(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
        let path = self.path_for(key)?;
        let staging = self.stage(&path, bytes)?;
        staging.persist(&path).map_err(|e| ArchiveError::Io(e.error))?;
        debug!(key, len = bytes.len(), "archive written");
        Ok(())
    }

    fn create(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            return Err(ArchiveError::AlreadyExists {
                key: key.to_string(),
            });
        }
        let staging = self.stage(&path, bytes)?;
        staging.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                ArchiveError::AlreadyExists {
                    key: key.to_string(),
                }
            } else {
                ArchiveError::Io(e.error)
            }
        })?;
        debug!(key, len = bytes.len(), "archive created on disk");
        Ok(())
    }

    fn exists(&self, key: &str) -> ArchiveResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> ArchiveResult<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> ArchiveResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| ArchiveError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if validate_key(&key).is_ok() {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn stored_len(&self, key: &str) -> ArchiveResult<Option<u64>> {
        let path = self.path_for(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::open(dir.path()).unwrap();

        store.create("src/main.rs,v", b"archive bytes").unwrap();
        assert!(store.exists("src/main.rs,v").unwrap());
        assert!(dir.path().join("src").join("main.rs,v").is_file());

        store.write("src/main.rs,v", b"replaced").unwrap();
        assert_eq!(store.read("src/main.rs,v").unwrap().unwrap(), b"replaced");
        assert_eq!(store.stored_len("src/main.rs,v").unwrap(), Some(8));

        assert!(store.delete("src/main.rs,v").unwrap());
        assert!(store.read("src/main.rs,v").unwrap().is_none());
        assert!(!store.delete("src/main.rs,v").unwrap());
    }

    #[test]
    fn create_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::open(dir.path()).unwrap();
        store.create("a,v", b"first").unwrap();
        let err = store.create("a,v", b"second").unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyExists { .. }));
        assert_eq!(store.read("a,v").unwrap().unwrap(), b"first");
    }

    #[test]
    fn keys_walk_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::open(dir.path()).unwrap();
        store.write("b,v", b"").unwrap();
        store.write("nested/deeper/a,v", b"").unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec!["b,v".to_string(), "nested/deeper/a,v".to_string()]
        );
    }

    #[test]
    fn no_staging_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.write("x,v", format!("v{i}").as_bytes()).unwrap();
        }
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.write("../escape", b"").unwrap_err(),
            ArchiveError::InvalidKey { .. }
        ));
    }
}
