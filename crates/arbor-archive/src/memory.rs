use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{ArchiveError, ArchiveResult};
use crate::store::{validate_key, ArchiveStore};

/// In-memory archive store.
///
/// Intended for tests and embedding. Archives are held behind a `RwLock`;
/// replacing a value under the write lock is the atomic swap.
pub struct InMemoryArchiveStore {
    archives: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self {
            archives: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored archives.
    pub fn len(&self) -> usize {
        self.archives.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite stored bytes without any checks. Lets tests simulate
    /// corruption of the backing medium.
    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) -> ArchiveResult<()> {
        let mut map = self.archives.write().map_err(|_| ArchiveError::LockPoisoned)?;
        map.insert(key.to_string(), bytes);
        Ok(())
    }
}

impl Default for InMemoryArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveStore for InMemoryArchiveStore {
    fn read(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>> {
        let map = self.archives.read().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
        validate_key(key)?;
        let mut map = self.archives.write().map_err(|_| ArchiveError::LockPoisoned)?;
        map.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn create(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
        validate_key(key)?;
        let mut map = self.archives.write().map_err(|_| ArchiveError::LockPoisoned)?;
        if map.contains_key(key) {
            return Err(ArchiveError::AlreadyExists {
                key: key.to_string(),
            });
        }
        map.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> ArchiveResult<bool> {
        let map = self.archives.read().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(map.contains_key(key))
    }

    fn delete(&self, key: &str) -> ArchiveResult<bool> {
        let mut map = self.archives.write().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(map.remove(key).is_some())
    }

    fn keys(&self) -> ArchiveResult<Vec<String>> {
        let map = self.archives.read().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(map.keys().cloned().collect())
    }

    fn stored_len(&self, key: &str) -> ArchiveResult<Option<u64>> {
        let map = self.archives.read().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(map.get(key).map(|bytes| bytes.len() as u64))
    }
}

impl std::fmt::Debug for InMemoryArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryArchiveStore")
            .field("archive_count", &self.len())
            .finish()
    }
}
