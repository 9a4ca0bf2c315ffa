//! The namespace tables the overlay is kept in.
//!
//! [`NamespaceTables`] is the small CRUD contract the overlay needs from its
//! backing store: one file table keyed by (branch, file), one directory
//! table keyed by (branch, directory), and append-only history tables that
//! receive the prior row whenever a current row is replaced or removed.
//! [`InMemoryTables`] is the reference implementation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use arbor_types::{BranchId, DirectoryId, FileId, Timestamp};

use crate::error::OverlayResult;
use crate::records::{DirectoryRecord, FileRecord, Versioned};

/// Storage contract for the overlay.
///
/// Tables are staged by cloning, so a transaction works on a private copy
/// and publishes it whole.
pub trait NamespaceTables: Clone + Send + Sync {
    /// Current row for `file` on `branch`.
    ///
    /// Returns `Ok(None)` if the branch has no row of its own.
    fn file_row(&self, branch: BranchId, file: FileId) -> OverlayResult<Option<Versioned<FileRecord>>>;

    /// Former rows for `file` on `branch`, oldest first.
    fn file_history(&self, branch: BranchId, file: FileId) -> OverlayResult<Vec<Versioned<FileRecord>>>;

    /// Insert or replace the row for `record.file_id` on `record.branch_id`.
    /// A replaced row moves to history, closed at `at`.
    fn put_file(&mut self, record: FileRecord, at: Timestamp) -> OverlayResult<()>;

    /// Remove the current row, moving it to history. Returns the removed record.
    fn remove_file(&mut self, branch: BranchId, file: FileId, at: Timestamp) -> OverlayResult<Option<FileRecord>>;

    /// Files that have or ever had a row on `branch`.
    fn file_ids(&self, branch: BranchId) -> OverlayResult<BTreeSet<FileId>>;

    fn max_file_id(&self) -> OverlayResult<Option<FileId>>;

    fn directory_row(
        &self,
        branch: BranchId,
        directory: DirectoryId,
    ) -> OverlayResult<Option<Versioned<DirectoryRecord>>>;

    fn directory_history(
        &self,
        branch: BranchId,
        directory: DirectoryId,
    ) -> OverlayResult<Vec<Versioned<DirectoryRecord>>>;

    fn put_directory(&mut self, record: DirectoryRecord, at: Timestamp) -> OverlayResult<()>;

    fn remove_directory(
        &mut self,
        branch: BranchId,
        directory: DirectoryId,
        at: Timestamp,
    ) -> OverlayResult<Option<DirectoryRecord>>;

    fn directory_ids(&self, branch: BranchId) -> OverlayResult<BTreeSet<DirectoryId>>;

    fn max_directory_id(&self) -> OverlayResult<Option<DirectoryId>>;

    fn find_file(&self, branch: BranchId, file: FileId) -> OverlayResult<Option<FileRecord>> {
        Ok(self.file_row(branch, file)?.map(|row| row.record))
    }

    /// The row for `file` on `branch` that was current at `at`.
    fn file_as_of(&self, branch: BranchId, file: FileId, at: Timestamp) -> OverlayResult<Option<FileRecord>> {
        if let Some(row) = self.file_row(branch, file)? {
            if row.covers(at) {
                return Ok(Some(row.record));
            }
        }
        Ok(self
            .file_history(branch, file)?
            .into_iter()
            .rev()
            .find(|row| row.covers(at))
            .map(|row| row.record))
    }

    fn find_directory(&self, branch: BranchId, directory: DirectoryId) -> OverlayResult<Option<DirectoryRecord>> {
        Ok(self.directory_row(branch, directory)?.map(|row| row.record))
    }

    fn directory_as_of(
        &self,
        branch: BranchId,
        directory: DirectoryId,
        at: Timestamp,
    ) -> OverlayResult<Option<DirectoryRecord>> {
        if let Some(row) = self.directory_row(branch, directory)? {
            if row.covers(at) {
                return Ok(Some(row.record));
            }
        }
        Ok(self
            .directory_history(branch, directory)?
            .into_iter()
            .rev()
            .find(|row| row.covers(at))
            .map(|row| row.record))
    }
}

/// Generic keyed table with a history side table.
#[derive(Clone, Debug)]
struct Table<K, R> {
    current: BTreeMap<K, Versioned<R>>,
    history: BTreeMap<K, Vec<Versioned<R>>>,
}

impl<K, R> Default for Table<K, R> {
    fn default() -> Self {
        Self {
            current: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, R: Clone + PartialEq> Table<K, R> {
    fn put(&mut self, key: K, record: R, at: Timestamp) {
        if let Some(existing) = self.current.get(&key) {
            if existing.record == record {
                return;
            }
        }
        self.retire(key, at);
        self.current.insert(key, Versioned::current(record, at));
    }

    fn retire(&mut self, key: K, at: Timestamp) -> Option<R> {
        let mut row = self.current.remove(&key)?;
        row.valid_to = Some(at.max(row.valid_from));
        let record = row.record.clone();
        self.history.entry(key).or_default().push(row);
        Some(record)
    }

    fn row(&self, key: &K) -> Option<Versioned<R>> {
        self.current.get(key).cloned()
    }

    fn past(&self, key: &K) -> Vec<Versioned<R>> {
        self.history.get(key).cloned().unwrap_or_default()
    }

    fn keys_where(&self, mut pred: impl FnMut(&K) -> bool) -> impl Iterator<Item = K> + '_ {
        let mut keys: Vec<K> = self
            .current
            .keys()
            .chain(self.history.keys())
            .filter(|k| pred(*k))
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
    }

    fn rows(&self) -> impl Iterator<Item = &Versioned<R>> {
        self.current.values()
    }

    fn history_rows(&self) -> impl Iterator<Item = &Versioned<R>> {
        self.history.values().flatten()
    }
}

/// In-memory namespace tables.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTables {
    files: Table<(BranchId, FileId), FileRecord>,
    directories: Table<(BranchId, DirectoryId), DirectoryRecord>,
}

/// Serializable image of [`InMemoryTables`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesDump {
    pub files: Vec<Versioned<FileRecord>>,
    pub file_history: Vec<Versioned<FileRecord>>,
    pub directories: Vec<Versioned<DirectoryRecord>>,
    pub directory_history: Vec<Versioned<DirectoryRecord>>,
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(&self) -> TablesDump {
        TablesDump {
            files: self.files.rows().cloned().collect(),
            file_history: self.files.history_rows().cloned().collect(),
            directories: self.directories.rows().cloned().collect(),
            directory_history: self.directories.history_rows().cloned().collect(),
        }
    }

    pub fn restore(dump: TablesDump) -> Self {
        let mut tables = Self::new();
        for row in dump.files {
            tables
                .files
                .current
                .insert((row.record.branch_id, row.record.file_id), row);
        }
        for row in dump.file_history {
            let key = (row.record.branch_id, row.record.file_id);
            tables.files.history.entry(key).or_default().push(row);
        }
        for row in dump.directories {
            tables
                .directories
                .current
                .insert((row.record.branch_id, row.record.directory_id), row);
        }
        for row in dump.directory_history {
            let key = (row.record.branch_id, row.record.directory_id);
            tables.directories.history.entry(key).or_default().push(row);
        }
        for rows in tables.files.history.values_mut() {
            rows.sort_by_key(|r| r.valid_from);
        }
        for rows in tables.directories.history.values_mut() {
            rows.sort_by_key(|r| r.valid_from);
        }
        tables
    }

    pub fn to_json(&self) -> OverlayResult<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    pub fn from_json(json: &str) -> OverlayResult<Self> {
        Ok(Self::restore(serde_json::from_str(json)?))
    }
}

impl NamespaceTables for InMemoryTables {
    fn file_row(&self, branch: BranchId, file: FileId) -> OverlayResult<Option<Versioned<FileRecord>>> {
        Ok(self.files.row(&(branch, file)))
    }

    fn file_history(&self, branch: BranchId, file: FileId) -> OverlayResult<Vec<Versioned<FileRecord>>> {
        Ok(self.files.past(&(branch, file)))
    }

    fn put_file(&mut self, record: FileRecord, at: Timestamp) -> OverlayResult<()> {
        self.files.put((record.branch_id, record.file_id), record, at);
        Ok(())
    }

    fn remove_file(&mut self, branch: BranchId, file: FileId, at: Timestamp) -> OverlayResult<Option<FileRecord>> {
        Ok(self.files.retire((branch, file), at))
    }

    fn file_ids(&self, branch: BranchId) -> OverlayResult<BTreeSet<FileId>> {
        Ok(self.files.keys_where(|(b, _)| *b == branch).map(|(_, f)| f).collect())
    }

    fn max_file_id(&self) -> OverlayResult<Option<FileId>> {
        Ok(self.files.keys_where(|_| true).map(|(_, f)| f).max())
    }

    fn directory_row(
        &self,
        branch: BranchId,
        directory: DirectoryId,
    ) -> OverlayResult<Option<Versioned<DirectoryRecord>>> {
        Ok(self.directories.row(&(branch, directory)))
    }

    fn directory_history(
        &self,
        branch: BranchId,
        directory: DirectoryId,
    ) -> OverlayResult<Vec<Versioned<DirectoryRecord>>> {
        Ok(self.directories.past(&(branch, directory)))
    }

    fn put_directory(&mut self, record: DirectoryRecord, at: Timestamp) -> OverlayResult<()> {
        self.directories
            .put((record.branch_id, record.directory_id), record, at);
        Ok(())
    }

    fn remove_directory(
        &mut self,
        branch: BranchId,
        directory: DirectoryId,
        at: Timestamp,
    ) -> OverlayResult<Option<DirectoryRecord>> {
        Ok(self.directories.retire((branch, directory), at))
    }

    fn directory_ids(&self, branch: BranchId) -> OverlayResult<BTreeSet<DirectoryId>> {
        Ok(self
            .directories
            .keys_where(|(b, _)| *b == branch)
            .map(|(_, d)| d)
            .collect())
    }

    fn max_directory_id(&self) -> OverlayResult<Option<DirectoryId>> {
        Ok(self.directories.keys_where(|_| true).map(|(_, d)| d).max())
    }
}
