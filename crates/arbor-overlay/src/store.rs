//! Transactional access to the namespace tables.
//!
//! Readers share the tables; a [`Transaction`] holds them exclusively for
//! its whole lifetime and works on a staged copy. [`Transaction::commit`]
//! publishes the copy in one assignment, dropping the transaction discards
//! it. A reader therefore sees either everything a transaction did or none
//! of it.

use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use arbor_types::Timestamp;

use crate::error::{OverlayError, OverlayResult};
use crate::tables::{InMemoryTables, NamespaceTables};

/// Owner of a project's namespace tables.
pub struct NamespaceStore<T = InMemoryTables> {
    tables: RwLock<T>,
}

impl<T: NamespaceTables> NamespaceStore<T> {
    pub fn new(tables: T) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Shared access to the published tables.
    pub fn read(&self) -> OverlayResult<RwLockReadGuard<'_, T>> {
        self.tables.read().map_err(|_| OverlayError::LockPoisoned)
    }

    /// Start a transaction; rows written through it are stamped with `at`.
    pub fn begin(&self, at: Timestamp) -> OverlayResult<Transaction<'_, T>> {
        let guard = self.tables.write().map_err(|_| OverlayError::LockPoisoned)?;
        let staged = guard.clone();
        Ok(Transaction {
            guard,
            staged: Some(staged),
            at,
        })
    }

    /// A copy of the published tables.
    pub fn snapshot(&self) -> OverlayResult<T> {
        Ok(self.read()?.clone())
    }
}

impl<T: NamespaceTables + Default> Default for NamespaceStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for NamespaceStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceStore").finish_non_exhaustive()
    }
}

/// Exclusive, all-or-nothing unit of work on the namespace tables.
pub struct Transaction<'a, T: NamespaceTables> {
    guard: RwLockWriteGuard<'a, T>,
    staged: Option<T>,
    at: Timestamp,
}

impl<'a, T: NamespaceTables> Transaction<'a, T> {
    /// Time stamped on every row this transaction writes.
    pub fn at(&self) -> Timestamp {
        self.at
    }

    /// The staged tables, including this transaction's own writes.
    pub fn tables(&self) -> &T {
        self.staged.as_ref().unwrap_or(&*self.guard)
    }

    pub fn tables_mut(&mut self) -> &mut T {
        self.staged.get_or_insert_with(|| self.guard.clone())
    }

    /// Publish every staged write.
    pub fn commit(mut self) {
        if let Some(staged) = self.staged.take() {
            *self.guard = staged;
            debug!(at = %self.at, "namespace transaction committed");
        }
    }
}

impl<T: NamespaceTables> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if self.staged.is_some() {
            debug!(at = %self.at, "namespace transaction rolled back");
        }
    }
}

impl<T: NamespaceTables> fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("at", &self.at)
            .field("open", &self.staged.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FileRecord;
    use arbor_types::{BranchId, DirectoryId, FileId};

    fn record(name: &str) -> FileRecord {
        FileRecord {
            file_id: FileId::new(1),
            branch_id: BranchId::TRUNK,
            directory_id: DirectoryId::new(1),
            name: name.to_string(),
            deleted: false,
        }
    }

    fn name_of(store: &NamespaceStore) -> Option<String> {
        store
            .read()
            .unwrap()
            .find_file(BranchId::TRUNK, FileId::new(1))
            .unwrap()
            .map(|r| r.name)
    }

    #[test]
    fn commit_publishes() {
        let store: NamespaceStore = NamespaceStore::default();
        let mut tx = store.begin(Timestamp::from_millis(5)).unwrap();
        let at = tx.at();
        tx.tables_mut().put_file(record("a.txt"), at).unwrap();
        assert_eq!(
            tx.tables().find_file(BranchId::TRUNK, FileId::new(1)).unwrap().unwrap().name,
            "a.txt"
        );
        tx.commit();
        assert_eq!(name_of(&store).as_deref(), Some("a.txt"));
    }

    #[test]
    fn drop_rolls_back() {
        let store: NamespaceStore = NamespaceStore::default();
        {
            let mut tx = store.begin(Timestamp::from_millis(5)).unwrap();
            tx.tables_mut().put_file(record("a.txt"), Timestamp::from_millis(5)).unwrap();
        }
        assert_eq!(name_of(&store), None);
    }

    #[test]
    fn readers_never_see_staged_rows() {
        let store = std::sync::Arc::new(NamespaceStore::<InMemoryTables>::default());
        let mut tx = store.begin(Timestamp::from_millis(5)).unwrap();
        tx.tables_mut().put_file(record("a.txt"), Timestamp::from_millis(5)).unwrap();

        let reader = {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || name_of(&store))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        tx.commit();
        // The reader blocks on the transaction and then sees the whole commit.
        assert_eq!(reader.join().unwrap().as_deref(), Some("a.txt"));
    }
}
