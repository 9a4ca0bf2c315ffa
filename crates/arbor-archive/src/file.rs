//! A persisted archive handle.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::archive::RevisionArchive;
use crate::codec;
use crate::error::{ArchiveError, ArchiveResult};
use crate::info::LogfileInfo;
use crate::store::ArchiveStore;

/// One archive bound to its key in an [`ArchiveStore`].
///
/// Mutations run against a staged copy of the archive. The copy is encoded,
/// checked against the integrity rule, written to the store, and only then
/// swapped in. A failure at any step leaves both the stored and the
/// in-memory archive exactly as they were. The write lock on the archive is
/// the per-archive exclusive section; readers share the read lock and always
/// see a complete archive.
pub struct ArchiveFile {
    key: RwLock<String>,
    store: Arc<dyn ArchiveStore>,
    state: RwLock<RevisionArchive>,
}

impl ArchiveFile {
    pub(crate) fn new(key: String, store: Arc<dyn ArchiveStore>, archive: RevisionArchive) -> Self {
        Self {
            key: RwLock::new(key),
            store,
            state: RwLock::new(archive),
        }
    }

    /// Load and validate the archive stored under `key`.
    pub fn load(key: &str, store: Arc<dyn ArchiveStore>) -> ArchiveResult<Self> {
        let bytes = store.read(key)?.ok_or_else(|| ArchiveError::NotFound {
            key: key.to_string(),
        })?;
        let archive = codec::decode(&bytes)?;
        Ok(Self::new(key.to_string(), store, archive))
    }

    /// Current storage key.
    pub fn key(&self) -> ArchiveResult<String> {
        self.key
            .read()
            .map(|k| k.clone())
            .map_err(|_| ArchiveError::LockPoisoned)
    }

    /// Run a read-only closure against the current archive.
    pub fn read<R>(&self, f: impl FnOnce(&RevisionArchive) -> R) -> ArchiveResult<R> {
        let guard = self.state.read().map_err(|_| ArchiveError::LockPoisoned)?;
        Ok(f(&guard))
    }

    pub fn info(&self) -> ArchiveResult<LogfileInfo> {
        self.read(|archive| archive.info())
    }

    /// Run a mutation as one all-or-nothing step.
    ///
    /// Nothing is written when the closure fails or leaves the archive
    /// unmodified. Callers layering their own error type over
    /// [`ArchiveError`] can return it straight from the closure.
    pub fn update<R, E>(&self, f: impl FnOnce(&mut RevisionArchive) -> Result<R, E>) -> Result<R, E>
    where
        E: From<ArchiveError>,
    {
        let mut guard = self.state.write().map_err(|_| ArchiveError::LockPoisoned)?;
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        if !staged.take_modified() {
            return Ok(out);
        }
        let key = self.key()?;
        let bytes = codec::encode(&mut staged)?;
        self.store.write(&key, &bytes)?;
        self.verify_stored_len(&key, &staged)?;
        *guard = staged;
        Ok(out)
    }

    /// Run a mutation and move the archive to `new_key` in the same step.
    ///
    /// The archive is created under the new key and checked there first;
    /// the old key is only removed once that succeeded. If the old key
    /// cannot be removed the new copy is dropped again, so the store never
    /// holds the same archive under two keys.
    pub fn relocate<R, E>(
        &self,
        new_key: &str,
        f: impl FnOnce(&mut RevisionArchive) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<ArchiveError>,
    {
        let mut guard = self.state.write().map_err(|_| ArchiveError::LockPoisoned)?;
        let mut key = self.key.write().map_err(|_| ArchiveError::LockPoisoned)?;
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        staged.take_modified();
        let bytes = codec::encode(&mut staged)?;
        self.store.create(new_key, &bytes)?;
        let moved = self
            .verify_stored_len(new_key, &staged)
            .and_then(|()| self.store.delete(&key));
        match moved {
            Ok(true) => {}
            Ok(false) => warn!(old = key.as_str(), new = new_key, "relocated archive had no stored original"),
            Err(e) => {
                if let Err(cleanup) = self.store.delete(new_key) {
                    warn!(key = new_key, error = %cleanup, "could not remove half-relocated archive");
                }
                return Err(e.into());
            }
        }
        debug!(old = key.as_str(), new = new_key, "archive relocated");
        *key = new_key.to_string();
        *guard = staged;
        Ok(out)
    }

    fn verify_stored_len(&self, key: &str, archive: &RevisionArchive) -> ArchiveResult<()> {
        match self.store.stored_len(key)? {
            Some(len) => codec::verify_tail(archive, len),
            None => Err(ArchiveError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Re-read the stored archive and check the integrity rule.
    pub fn verify(&self) -> ArchiveResult<()> {
        let key = self.key()?;
        let bytes = self.store.read(&key)?.ok_or_else(|| ArchiveError::NotFound {
            key: key.clone(),
        })?;
        let stored = codec::decode(&bytes)?;
        for idx in 0..stored.revision_count() {
            stored.content(idx)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ArchiveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = self.key().unwrap_or_default();
        let revisions = self.read(|a| a.revision_count()).unwrap_or(0);
        f.debug_struct("ArchiveFile")
            .field("key", &key)
            .field("revision_count", &revisions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{CheckInOptions, CreateArchive, LabelArgs, RevisionSelector};
    use crate::memory::InMemoryArchiveStore;
    use arbor_types::{FileId, Timestamp};
    use std::thread;

    fn make_file(store: Arc<InMemoryArchiveStore>) -> ArchiveFile {
        let archive = RevisionArchive::create(CreateArchive::new(FileId::new(1), "a.txt", "alice"), b"v1\n").unwrap();
        let mut staged = archive.clone();
        let bytes = codec::encode(&mut staged).unwrap();
        store.create("a.txt,v", &bytes).unwrap();
        ArchiveFile::new("a.txt,v".into(), store, staged)
    }

    #[test]
    fn update_persists_and_reloads() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = make_file(store.clone());
        file.update(|a| a.lock_revision("alice", "1.1", Timestamp::now())).unwrap();
        file.update(|a| a.check_in("alice", "1.1", b"v2\n", "second", &CheckInOptions::default()))
            .unwrap();

        let reloaded = ArchiveFile::load("a.txt,v", store).unwrap();
        let content = reloaded.read(|a| a.get_revision(&RevisionSelector::Default)).unwrap().unwrap();
        assert_eq!(content, b"v2\n");
        reloaded.verify().unwrap();
    }

    #[test]
    fn failed_update_changes_nothing() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = make_file(store.clone());
        let before = store.read("a.txt,v").unwrap();

        let err = file
            .update(|a| {
                a.label_revision("alice", &LabelArgs::new("L"))?;
                a.check_in("bob", "1.1", b"x\n", "", &CheckInOptions::default())
            })
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NotLocked { .. }));
        assert_eq!(store.read("a.txt,v").unwrap(), before);
        assert!(file.read(|a| a.find_label("L").is_none()).unwrap());
    }

    #[test]
    fn unmodified_update_skips_write() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = make_file(store.clone());
        store.put_raw("a.txt,v", b"sentinel".to_vec()).unwrap();
        let applied = file.update(|a| a.unlabel_revision("alice", "none")).unwrap();
        assert!(!applied);
        assert_eq!(store.read("a.txt,v").unwrap().unwrap(), b"sentinel");
    }

    #[test]
    fn relocate_moves_key() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = make_file(store.clone());
        file.relocate("b.txt,v", |a| a.rename_archive("alice", "a.txt", "b.txt", Timestamp::now()))
            .unwrap();
        assert_eq!(file.key().unwrap(), "b.txt,v");
        assert!(!store.exists("a.txt,v").unwrap());
        assert!(store.exists("b.txt,v").unwrap());
        assert_eq!(file.read(|a| a.revision_count()).unwrap(), 2);
    }

    #[test]
    fn relocate_onto_existing_key_fails_cleanly() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = make_file(store.clone());
        store.write("taken,v", b"other").unwrap();
        let err = file
            .relocate("taken,v", |a| a.move_archive("alice", "a.txt", "x/a.txt", Timestamp::now()))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyExists { .. }));
        assert_eq!(file.key().unwrap(), "a.txt,v");
        assert_eq!(file.read(|a| a.revision_count()).unwrap(), 1);
    }

    /// Memory store whose deletes fail for one key.
    struct StuckKey {
        inner: InMemoryArchiveStore,
        stuck: &'static str,
    }

    impl ArchiveStore for StuckKey {
        fn read(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>> {
            self.inner.read(key)
        }
        fn write(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
            self.inner.write(key, bytes)
        }
        fn create(&self, key: &str, bytes: &[u8]) -> ArchiveResult<()> {
            self.inner.create(key, bytes)
        }
        fn exists(&self, key: &str) -> ArchiveResult<bool> {
            self.inner.exists(key)
        }
        fn delete(&self, key: &str) -> ArchiveResult<bool> {
            if key == self.stuck {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into());
            }
            self.inner.delete(key)
        }
        fn keys(&self) -> ArchiveResult<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn relocate_rolls_back_when_old_key_cannot_be_removed() {
        let store = Arc::new(StuckKey {
            inner: InMemoryArchiveStore::new(),
            stuck: "a.txt,v",
        });
        let archive = RevisionArchive::create(CreateArchive::new(FileId::new(1), "a.txt", "alice"), b"v1\n").unwrap();
        let mut staged = archive.clone();
        store.create("a.txt,v", &codec::encode(&mut staged).unwrap()).unwrap();
        let file = ArchiveFile::new("a.txt,v".into(), store.clone(), staged);

        let err = file
            .relocate("b.txt,v", |a| a.rename_archive("alice", "a.txt", "b.txt", Timestamp::now()))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert_eq!(store.keys().unwrap(), vec!["a.txt,v".to_string()]);
        assert_eq!(file.key().unwrap(), "a.txt,v");
        assert_eq!(file.read(|a| a.revision_count()).unwrap(), 1);
        file.verify().unwrap();
    }

    #[test]
    fn corrupted_store_detected_on_load() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let _file = make_file(store.clone());
        let mut bytes = store.read("a.txt,v").unwrap().unwrap();
        bytes.truncate(bytes.len() - 2);
        store.put_raw("a.txt,v", bytes).unwrap();
        let err = ArchiveFile::load("a.txt,v", store).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn concurrent_readers_see_whole_revisions() {
        let store = Arc::new(InMemoryArchiveStore::new());
        let file = Arc::new(make_file(store));
        file.update(|a| a.lock_revision("alice", "1.1", Timestamp::now())).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let file = Arc::clone(&file);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let content = file
                            .read(|a| a.get_revision(&RevisionSelector::Default))
                            .unwrap()
                            .unwrap();
                        assert!(content.starts_with(b"v"));
                    }
                })
            })
            .collect();

        let opts = CheckInOptions {
            retain_lock: true,
            ..CheckInOptions::default()
        };
        let mut rev = "1.1".to_string();
        for i in 2..12 {
            let body = format!("v{i}\n");
            rev = file
                .update(|a| a.check_in("alice", &rev, body.as_bytes(), "", &opts))
                .unwrap()
                .revision
                .to_string();
        }
        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(file.read(|a| a.revision_count()).unwrap(), 11);
    }
}
