//! Storage-level management of a project's archives.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use arbor_types::{FileId, Timestamp};

use crate::archive::{CreateArchive, RevisionArchive};
use crate::cemetery::cemetery_name;
use crate::codec;
use crate::error::{ArchiveError, ArchiveResult};
use crate::file::ArchiveFile;
use crate::store::{validate_key, ArchiveStore};

/// Suffix appended to a workfile path to form its archive key.
pub const ARCHIVE_SUFFIX: &str = ",v";

/// Default directory receiving deleted archives.
pub const DEFAULT_CEMETERY_DIR: &str = ".cemetery";

/// Archive key for a workfile path.
pub fn archive_key(workfile_path: &str) -> String {
    format!("{workfile_path}{ARCHIVE_SUFFIX}")
}

/// Workfile path for an archive key, if the key names a live archive.
pub fn workfile_path(key: &str) -> Option<&str> {
    key.strip_suffix(ARCHIVE_SUFFIX)
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// All archives of one project, keyed by workfile path.
///
/// Open archives are cached so that every caller shares one
/// [`ArchiveFile`] (and therefore one lock) per archive.
pub struct ArchiveRepository {
    store: Arc<dyn ArchiveStore>,
    cemetery_dir: String,
    open: RwLock<HashMap<String, Arc<ArchiveFile>>>,
    by_file_id: RwLock<HashMap<FileId, String>>,
}

impl ArchiveRepository {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self::with_cemetery_dir(store, DEFAULT_CEMETERY_DIR)
    }

    pub fn with_cemetery_dir(store: Arc<dyn ArchiveStore>, cemetery_dir: impl Into<String>) -> Self {
        Self {
            store,
            cemetery_dir: cemetery_dir.into(),
            open: RwLock::new(HashMap::new()),
            by_file_id: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArchiveStore> {
        &self.store
    }

    pub fn cemetery_dir(&self) -> &str {
        &self.cemetery_dir
    }

    /// Storage key of the cemetery entry for `file_id`.
    pub fn cemetery_key(&self, file_id: FileId) -> String {
        join_path(&self.cemetery_dir, &cemetery_name(file_id))
    }

    fn remember(&self, file: Arc<ArchiveFile>) -> ArchiveResult<Arc<ArchiveFile>> {
        let key = file.key()?;
        let file_id = file.read(|a| a.file_id())?;
        self.open
            .write()
            .map_err(|_| ArchiveError::LockPoisoned)?
            .insert(key.clone(), Arc::clone(&file));
        self.by_file_id
            .write()
            .map_err(|_| ArchiveError::LockPoisoned)?
            .insert(file_id, key);
        Ok(file)
    }

    fn forget(&self, key: &str) -> ArchiveResult<()> {
        self.open
            .write()
            .map_err(|_| ArchiveError::LockPoisoned)?
            .remove(key);
        Ok(())
    }

    /// Create the archive for `path` holding `content` as revision 1.1.
    pub fn create_archive(&self, path: &str, params: CreateArchive, content: &[u8]) -> ArchiveResult<Arc<ArchiveFile>> {
        let key = archive_key(path);
        validate_key(&key)?;
        let mut archive = RevisionArchive::create(params, content)?;
        let bytes = codec::encode(&mut archive)?;
        self.store.create(&key, &bytes)?;
        info!(key = %key, file_id = %archive.file_id(), "archive created");
        self.remember(Arc::new(ArchiveFile::new(key, Arc::clone(&self.store), archive)))
    }

    /// Open the archive for `path`.
    pub fn open(&self, path: &str) -> ArchiveResult<Arc<ArchiveFile>> {
        self.open_key(&archive_key(path))
    }

    /// Open the archive stored under `key`.
    pub fn open_key(&self, key: &str) -> ArchiveResult<Arc<ArchiveFile>> {
        let cached = self
            .open
            .read()
            .map_err(|_| ArchiveError::LockPoisoned)?
            .get(key)
            .cloned();
        if let Some(file) = cached {
            return Ok(file);
        }
        let file = ArchiveFile::load(key, Arc::clone(&self.store))?;
        debug!(key, "archive loaded");
        self.remember(Arc::new(file))
    }

    pub fn exists(&self, path: &str) -> ArchiveResult<bool> {
        self.store.exists(&archive_key(path))
    }

    /// Locate an archive by file id, live or in the cemetery.
    ///
    /// Falls back to scanning every stored archive when the id has not been
    /// seen yet.
    pub fn open_by_file_id(&self, file_id: FileId) -> ArchiveResult<Option<Arc<ArchiveFile>>> {
        let known = self
            .by_file_id
            .read()
            .map_err(|_| ArchiveError::LockPoisoned)?
            .get(&file_id)
            .cloned();
        if let Some(key) = known {
            match self.open_key(&key) {
                Ok(file) => return Ok(Some(file)),
                Err(ArchiveError::NotFound { .. }) => {
                    warn!(%file_id, key = %key, "stale file id index entry");
                }
                Err(e) => return Err(e),
            }
        }
        for key in self.store.keys()? {
            match self.open_key(&key) {
                Ok(file) => {
                    if file.read(|a| a.file_id())? == file_id {
                        return Ok(Some(file));
                    }
                }
                Err(e) if e.is_fatal() => {
                    warn!(key = %key, error = %e, "skipping unreadable archive during scan");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn relocate(
        &self,
        file: &ArchiveFile,
        new_key: &str,
        f: impl FnOnce(&mut RevisionArchive) -> ArchiveResult<usize>,
    ) -> ArchiveResult<usize> {
        validate_key(new_key)?;
        let old_key = file.key()?;
        let added = file.relocate(new_key, f)?;
        self.forget(&old_key)?;
        Ok(added)
    }

    /// Rename the workfile at `path` to `new_name` within its directory.
    ///
    /// Returns the number of bookkeeping revisions added.
    pub fn rename_archive(&self, user: &str, path: &str, new_name: &str, at: Timestamp) -> ArchiveResult<usize> {
        let file = self.open(path)?;
        let (dir, old_name) = split_path(path);
        let new_key = archive_key(&join_path(dir, new_name));
        let added = self.relocate(&file, &new_key, |a| a.rename_archive(user, old_name, new_name, at))?;
        self.remember(file)?;
        info!(user, path, new_name, "archive renamed");
        Ok(added)
    }

    /// Move the workfile at `path` into directory `new_dir`, keeping its name.
    pub fn move_archive(&self, user: &str, path: &str, new_dir: &str, at: Timestamp) -> ArchiveResult<usize> {
        let file = self.open(path)?;
        let (_, name) = split_path(path);
        let new_path = join_path(new_dir, name);
        let added = self.relocate(&file, &archive_key(&new_path), |a| a.move_archive(user, path, &new_path, at))?;
        self.remember(file)?;
        info!(user, path, new_path = %new_path, "archive moved");
        Ok(added)
    }

    /// Move the archive for `path` into the cemetery.
    pub fn delete_archive(&self, user: &str, path: &str, at: Timestamp) -> ArchiveResult<usize> {
        let file = self.open(path)?;
        let file_id = file.read(|a| a.file_id())?;
        let name = cemetery_name(file_id);
        let new_key = self.cemetery_key(file_id);
        let added = self.relocate(&file, &new_key, |a| a.delete_archive(user, path, &name, at))?;
        self.remember(file)?;
        info!(user, path, %file_id, "archive moved to cemetery");
        Ok(added)
    }

    /// Bring a deleted archive back to `path`.
    pub fn restore_archive(&self, user: &str, file_id: FileId, path: &str, at: Timestamp) -> ArchiveResult<usize> {
        let cemetery_key = self.cemetery_key(file_id);
        let file = self.open_key(&cemetery_key)?;
        let added = self.relocate(&file, &archive_key(path), |a| a.move_archive(user, &cemetery_key, path, at))?;
        self.remember(file)?;
        info!(user, path, %file_id, "archive restored from cemetery");
        Ok(added)
    }

    /// Workfile paths of all live archives, sorted.
    pub fn workfile_paths(&self) -> ArchiveResult<Vec<String>> {
        let prefix = format!("{}/", self.cemetery_dir);
        Ok(self
            .store
            .keys()?
            .iter()
            .filter(|k| !k.starts_with(&prefix))
            .filter_map(|k| workfile_path(k))
            .map(str::to_string)
            .collect())
    }
}

impl std::fmt::Debug for ArchiveRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self.open.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("ArchiveRepository")
            .field("cemetery_dir", &self.cemetery_dir)
            .field("open_archives", &open)
            .finish()
    }
}
