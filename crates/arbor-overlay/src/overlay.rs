//! Per-branch file and directory namespace.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use arbor_archive::{cemetery_name, DEFAULT_CEMETERY_DIR};
use arbor_branch::{Branch, BranchRegistry};
use arbor_types::{BranchId, DirectoryId, FileId, Timestamp};

use crate::alloc::{DirectoryIdAllocator, FileIdAllocator, IdAllocator};
use crate::error::{OverlayError, OverlayResult};
use crate::namespace::Namespace;
use crate::records::{DirectoryContents, DirectoryRecord, FileIdInfo, FileRecord};
use crate::store::{NamespaceStore, Transaction};
use crate::tables::{InMemoryTables, NamespaceTables};

/// The project root directory.
pub const ROOT_DIRECTORY: DirectoryId = DirectoryId::new(1);

/// The directory deleted files are parked in.
pub const CEMETERY_DIRECTORY: DirectoryId = DirectoryId::new(2);

pub const MAX_NAME_LEN: usize = 255;

/// Validate a file or directory name (a single path component).
pub fn validate_name(name: &str) -> OverlayResult<()> {
    let invalid = |reason: &str| OverlayError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is too long"));
    }
    if name == "." || name == ".." {
        return Err(invalid("relative names are not allowed"));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(invalid("contains a forbidden character"));
    }
    Ok(())
}

/// The namespace of every branch of one project.
///
/// Branches share archives but not names: each branch may move, rename,
/// delete and restore files independently. A branch records only what it
/// changed and inherits everything else from its parent, so a trunk move
/// shows up on every branch that has not moved the file itself.
pub struct DirectoryOverlay<T: NamespaceTables = InMemoryTables> {
    registry: Arc<BranchRegistry>,
    store: NamespaceStore<T>,
    file_ids: FileIdAllocator,
    directory_ids: DirectoryIdAllocator,
}

impl DirectoryOverlay<InMemoryTables> {
    /// An empty in-memory overlay with the default cemetery name.
    pub fn in_memory(registry: Arc<BranchRegistry>) -> OverlayResult<Self> {
        Self::new(registry, InMemoryTables::new(), DEFAULT_CEMETERY_DIR)
    }
}

impl<T: NamespaceTables> DirectoryOverlay<T> {
    /// Open an overlay over `tables`, creating the root and the cemetery
    /// directories on the trunk if they are missing.
    pub fn new(registry: Arc<BranchRegistry>, mut tables: T, cemetery_dir: &str) -> OverlayResult<Self> {
        validate_name(cemetery_dir)?;
        let epoch = Timestamp::from_millis(0);
        for (id, name) in [(ROOT_DIRECTORY, ""), (CEMETERY_DIRECTORY, cemetery_dir)] {
            if tables.find_directory(BranchId::TRUNK, id)?.is_none() {
                let record = DirectoryRecord {
                    directory_id: id,
                    branch_id: BranchId::TRUNK,
                    parent: None,
                    name: name.to_string(),
                    deleted: false,
                };
                tables.put_directory(record, epoch)?;
            }
        }
        let last_file = tables.max_file_id()?.map_or(0, |id| id.get());
        let last_directory = tables
            .max_directory_id()?
            .map_or(0, |id| id.get())
            .max(CEMETERY_DIRECTORY.get());
        Ok(Self {
            registry,
            store: NamespaceStore::new(tables),
            file_ids: FileIdAllocator::after(last_file, "file"),
            directory_ids: DirectoryIdAllocator::after(last_directory, "directory"),
        })
    }

    pub fn registry(&self) -> &Arc<BranchRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &NamespaceStore<T> {
        &self.store
    }

    /// Identity for a newly created file.
    pub fn allocate_file_id(&self) -> OverlayResult<FileId> {
        self.file_ids.allocate()
    }

    /// Keep `file` from being allocated, e.g. for an archive found in
    /// storage but not in the namespace.
    pub fn reserve_file_id(&self, file: FileId) {
        self.file_ids.reserve_through(file.get());
    }

    fn chain(&self, branch: &str) -> OverlayResult<Vec<Branch>> {
        chain_of(&self.registry, branch)
    }

    fn read_with<R>(&self, branch: &str, f: impl FnOnce(&Namespace<'_, T>) -> OverlayResult<R>) -> OverlayResult<R> {
        let chain = self.chain(branch)?;
        let tables = self.store.read()?;
        let namespace = Namespace::new(&*tables, &chain)?;
        f(&namespace)
    }

    /// Start an exclusive namespace transaction stamped with `at`.
    pub fn begin(&self, at: Timestamp) -> OverlayResult<OverlayTransaction<'_, T>> {
        Ok(OverlayTransaction {
            overlay: self,
            tx: self.store.begin(at)?,
        })
    }

    /// Run `f` in a transaction, committing only if it succeeds.
    pub fn transaction<R, E>(
        &self,
        at: Timestamp,
        f: impl FnOnce(&mut OverlayTransaction<'_, T>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<OverlayError>,
    {
        let mut tx = self.begin(at)?;
        let out = f(&mut tx)?;
        tx.commit();
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Files and child directories of `directory` on `branch`.
    pub fn directory_contents(&self, branch: &str, directory: DirectoryId) -> OverlayResult<DirectoryContents> {
        self.read_with(branch, |ns| ns.contents(directory))
    }

    /// Deleted files on `branch`, keyed by file id, with their cemetery names.
    pub fn cemetery_contents(&self, branch: &str) -> OverlayResult<DirectoryContents> {
        self.directory_contents(branch, CEMETERY_DIRECTORY)
    }

    /// Child directories of `directory` visible on `branch`: now for writable
    /// branches, as of the branch date for date-based ones.
    pub fn get_directory_id_collection_for_branch(
        &self,
        branch: &str,
        directory: DirectoryId,
    ) -> OverlayResult<std::collections::BTreeMap<DirectoryId, String>> {
        self.read_with(branch, |ns| {
            ns.live_directory(directory)?;
            ns.child_directories(directory)
        })
    }

    /// Where `file` lives on `branch`.
    pub fn file_id_info(&self, branch: &str, file: FileId) -> OverlayResult<Option<FileIdInfo>> {
        self.read_with(branch, |ns| ns.file_info(file))
    }

    /// The file at project-relative `path` on `branch`.
    pub fn resolve_file(&self, branch: &str, path: &str) -> OverlayResult<FileRecord> {
        self.read_with(branch, |ns| ns.resolve_file(ROOT_DIRECTORY, path))
    }

    pub fn resolve_directory(&self, branch: &str, path: &str) -> OverlayResult<DirectoryId> {
        self.read_with(branch, |ns| ns.resolve_directory(ROOT_DIRECTORY, path))
    }

    pub fn directory_path(&self, branch: &str, directory: DirectoryId) -> OverlayResult<String> {
        self.read_with(branch, |ns| ns.directory_path(directory))
    }

    /// Every live (not deleted) file on `branch` with its project path.
    pub fn files_on_branch(&self, branch: &str) -> OverlayResult<Vec<FileIdInfo>> {
        self.read_with(branch, |ns| {
            let mut infos = Vec::new();
            for record in ns.files()? {
                if record.deleted || ns.live_directory(record.directory_id).is_err() {
                    continue;
                }
                if let Some(info) = ns.file_info(record.file_id)? {
                    infos.push(info);
                }
            }
            infos.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(infos)
        })
    }

    // ------------------------------------------------------------------
    // Single-operation transactions
    // ------------------------------------------------------------------

    pub fn add_file_to_branch(
        &self,
        branch: &str,
        directory: DirectoryId,
        file: FileId,
        name: &str,
        at: Timestamp,
    ) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.add_file_to_branch(branch, directory, file, name))
    }

    pub fn rename_file_on_branch(
        &self,
        branch: &str,
        file: FileId,
        old_name: &str,
        new_name: &str,
        at: Timestamp,
    ) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.rename_file_on_branch(branch, file, old_name, new_name))
    }

    pub fn move_file_on_branch(
        &self,
        branch: &str,
        origin: DirectoryId,
        destination: DirectoryId,
        file: FileId,
        at: Timestamp,
    ) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.move_file_on_branch(branch, origin, destination, file))
    }

    pub fn delete_file_from_branch(
        &self,
        branch: &str,
        origin: DirectoryId,
        file: FileId,
        name: &str,
        at: Timestamp,
    ) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.delete_file_from_branch(branch, origin, file, name))
    }

    pub fn move_file_from_cemetery(
        &self,
        branch: &str,
        destination: DirectoryId,
        file: FileId,
        name: &str,
        at: Timestamp,
    ) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.move_file_from_cemetery(branch, destination, file, name))
    }

    pub fn add_directory(
        &self,
        branch: &str,
        parent: DirectoryId,
        name: &str,
        at: Timestamp,
    ) -> OverlayResult<DirectoryRecord> {
        self.transaction(at, |tx| tx.add_directory(branch, parent, name))
    }

    pub fn delete_directory(&self, branch: &str, directory: DirectoryId, at: Timestamp) -> OverlayResult<DirectoryRecord> {
        self.transaction(at, |tx| tx.delete_directory(branch, directory))
    }
}

impl<T: NamespaceTables> fmt::Debug for DirectoryOverlay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryOverlay")
            .field("registry", &self.registry)
            .field("file_ids", &self.file_ids)
            .field("directory_ids", &self.directory_ids)
            .finish()
    }
}

pub(crate) fn chain_of(registry: &BranchRegistry, branch: &str) -> OverlayResult<Vec<Branch>> {
    let found = registry.get(branch).map_err(OverlayError::from_lookup)?;
    registry.ancestry(found.id).map_err(OverlayError::from_lookup)
}

/// An open namespace transaction.
///
/// Holds the namespace exclusively until committed or dropped. Dropping
/// without [`commit`](Self::commit) discards every change.
pub struct OverlayTransaction<'a, T: NamespaceTables> {
    overlay: &'a DirectoryOverlay<T>,
    tx: Transaction<'a, T>,
}

impl<'a, T: NamespaceTables> OverlayTransaction<'a, T> {
    pub fn at(&self) -> Timestamp {
        self.tx.at()
    }

    pub fn commit(self) {
        self.tx.commit();
    }

    pub(crate) fn tables(&self) -> &T {
        self.tx.tables()
    }

    pub(crate) fn tables_mut(&mut self) -> &mut T {
        self.tx.tables_mut()
    }

    /// Ancestry of `branch`, which must accept namespace changes.
    pub(crate) fn writable_chain(&self, branch: &str) -> OverlayResult<Vec<Branch>> {
        let chain = self.overlay.chain(branch)?;
        if !chain[0].is_writable() {
            debug!(branch, "namespace change rejected on read-only branch");
            return Err(OverlayError::ReadOnly {
                branch: branch.to_string(),
            });
        }
        Ok(chain)
    }

    /// Namespace of `branch` including this transaction's writes.
    pub fn namespace<'c>(&'c self, chain: &'c [Branch]) -> OverlayResult<Namespace<'c, T>> {
        Namespace::new(self.tx.tables(), chain)
    }

    /// Record `record` as `chain[0]`'s view of the file. When the branch
    /// would inherit exactly this from its parent the override is dropped
    /// instead, so later parent changes flow through again.
    pub(crate) fn write_file(&mut self, chain: &[Branch], record: FileRecord) -> OverlayResult<()> {
        let at = self.at();
        let branch_id = chain[0].id;
        if !chain[0].is_trunk() {
            let inherited = self.namespace(chain)?.inherited_file(record.file_id)?;
            let same = inherited.is_some_and(|parent| {
                parent.directory_id == record.directory_id && parent.name == record.name && parent.deleted == record.deleted
            });
            if same {
                self.tables_mut().remove_file(branch_id, record.file_id, at)?;
                return Ok(());
            }
        }
        self.tables_mut().put_file(record, at)
    }

    /// Fail unless `name` is free in `directory` (apart from `except`).
    fn ensure_free(
        &self,
        chain: &[Branch],
        directory: DirectoryId,
        name: &str,
        except: Option<FileId>,
    ) -> OverlayResult<()> {
        let contents = self.namespace(chain)?.contents(directory)?;
        let clash = match contents.file_named(name) {
            Some(id) => Some(id) != except,
            None => contents.directory_named(name).is_some(),
        };
        if clash {
            return Err(OverlayError::NameConflict {
                directory,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_ordinary(&self, chain: &[Branch], directory: DirectoryId, operation: &str) -> OverlayResult<()> {
        if directory == CEMETERY_DIRECTORY {
            return Err(OverlayError::NotSupported {
                operation: operation.to_string(),
                branch: chain[0].name.clone(),
            });
        }
        self.namespace(chain)?.live_directory(directory)?;
        Ok(())
    }

    /// The file's visible record, which must not be in the cemetery.
    fn live_file(&self, chain: &[Branch], file: FileId) -> OverlayResult<FileRecord> {
        let record = self.namespace(chain)?.existing_file(file)?;
        if record.deleted {
            return Err(OverlayError::FileNotFound {
                file,
                branch: chain[0].name.clone(),
            });
        }
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Register a newly created file in one branch's namespace.
    pub fn add_file_to_branch(
        &mut self,
        branch: &str,
        directory: DirectoryId,
        file: FileId,
        name: &str,
    ) -> OverlayResult<FileRecord> {
        validate_name(name)?;
        let chain = self.writable_chain(branch)?;
        self.ensure_ordinary(&chain, directory, "add a file to the cemetery")?;
        if self.namespace(&chain)?.file(file)?.is_some() {
            return Err(OverlayError::FileExists {
                file,
                branch: branch.to_string(),
            });
        }
        self.ensure_free(&chain, directory, name, None)?;

        let record = FileRecord {
            file_id: file,
            branch_id: chain[0].id,
            directory_id: directory,
            name: name.to_string(),
            deleted: false,
        };
        let at = self.at();
        self.tables_mut().put_file(record.clone(), at)?;
        debug!(branch, file = %file, directory = %directory, name, "file added");
        Ok(record)
    }

    pub fn rename_file_on_branch(
        &mut self,
        branch: &str,
        file: FileId,
        old_name: &str,
        new_name: &str,
    ) -> OverlayResult<FileRecord> {
        validate_name(new_name)?;
        let chain = self.writable_chain(branch)?;
        let current = self.live_file(&chain, file)?;
        if current.name != old_name {
            return Err(OverlayError::NameMismatch {
                file,
                expected: old_name.to_string(),
                actual: current.name,
            });
        }
        self.ensure_free(&chain, current.directory_id, new_name, Some(file))?;

        let record = FileRecord {
            branch_id: chain[0].id,
            name: new_name.to_string(),
            ..current
        };
        self.write_file(&chain, record.clone())?;
        debug!(branch, file = %file, old_name, new_name, "file renamed");
        Ok(record)
    }

    pub fn move_file_on_branch(
        &mut self,
        branch: &str,
        origin: DirectoryId,
        destination: DirectoryId,
        file: FileId,
    ) -> OverlayResult<FileRecord> {
        let chain = self.writable_chain(branch)?;
        let current = self.live_file(&chain, file)?;
        if current.directory_id != origin {
            return Err(OverlayError::DirectoryMismatch {
                file,
                expected: origin,
                actual: current.directory_id,
            });
        }
        self.ensure_ordinary(&chain, destination, "move a file into the cemetery")?;
        self.ensure_free(&chain, destination, &current.name, Some(file))?;

        let record = FileRecord {
            branch_id: chain[0].id,
            directory_id: destination,
            ..current
        };
        self.write_file(&chain, record.clone())?;
        debug!(branch, file = %file, from = %origin, to = %destination, "file moved");
        Ok(record)
    }

    /// Park the file in the cemetery under its derived name. Returns the
    /// cemetery entry.
    pub fn delete_file_from_branch(
        &mut self,
        branch: &str,
        origin: DirectoryId,
        file: FileId,
        name: &str,
    ) -> OverlayResult<FileRecord> {
        let chain = self.writable_chain(branch)?;
        let current = self.live_file(&chain, file)?;
        if current.directory_id != origin {
            return Err(OverlayError::DirectoryMismatch {
                file,
                expected: origin,
                actual: current.directory_id,
            });
        }
        if current.name != name {
            return Err(OverlayError::NameMismatch {
                file,
                expected: name.to_string(),
                actual: current.name,
            });
        }

        let record = FileRecord {
            file_id: file,
            branch_id: chain[0].id,
            directory_id: CEMETERY_DIRECTORY,
            name: cemetery_name(file),
            deleted: true,
        };
        self.write_file(&chain, record.clone())?;
        info!(branch, file = %file, origin = %origin, name, cemetery_name = %record.name, "file deleted");
        Ok(record)
    }

    /// Bring a deleted file back under `name` in `destination`. The file
    /// keeps its identity.
    pub fn move_file_from_cemetery(
        &mut self,
        branch: &str,
        destination: DirectoryId,
        file: FileId,
        name: &str,
    ) -> OverlayResult<FileRecord> {
        validate_name(name)?;
        let chain = self.writable_chain(branch)?;
        let current = self.namespace(&chain)?.existing_file(file)?;
        if !current.deleted {
            return Err(OverlayError::NotInCemetery {
                file,
                branch: branch.to_string(),
            });
        }
        self.ensure_ordinary(&chain, destination, "restore a file into the cemetery")?;
        self.ensure_free(&chain, destination, name, Some(file))?;

        let record = FileRecord {
            file_id: file,
            branch_id: chain[0].id,
            directory_id: destination,
            name: name.to_string(),
            deleted: false,
        };
        self.write_file(&chain, record.clone())?;
        info!(branch, file = %file, destination = %destination, name, "file restored from cemetery");
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------

    pub fn add_directory(&mut self, branch: &str, parent: DirectoryId, name: &str) -> OverlayResult<DirectoryRecord> {
        validate_name(name)?;
        let chain = self.writable_chain(branch)?;
        self.ensure_ordinary(&chain, parent, "create a directory in the cemetery")?;
        self.ensure_free(&chain, parent, name, None)?;

        let record = DirectoryRecord {
            directory_id: self.overlay.directory_ids.allocate()?,
            branch_id: chain[0].id,
            parent: Some(parent),
            name: name.to_string(),
            deleted: false,
        };
        let at = self.at();
        self.tables_mut().put_directory(record.clone(), at)?;
        debug!(branch, directory = %record.directory_id, parent = %parent, name, "directory added");
        Ok(record)
    }

    /// Soft-delete an empty directory on one branch.
    pub fn delete_directory(&mut self, branch: &str, directory: DirectoryId) -> OverlayResult<DirectoryRecord> {
        let chain = self.writable_chain(branch)?;
        if directory == ROOT_DIRECTORY || directory == CEMETERY_DIRECTORY {
            return Err(OverlayError::NotSupported {
                operation: "delete a reserved directory".into(),
                branch: branch.to_string(),
            });
        }
        let namespace = self.namespace(&chain)?;
        let current = namespace.live_directory(directory)?;
        if !namespace.contents(directory)?.is_empty() {
            return Err(OverlayError::DirectoryNotEmpty {
                directory,
                branch: branch.to_string(),
            });
        }

        let record = DirectoryRecord {
            branch_id: chain[0].id,
            deleted: true,
            ..current
        };
        let at = self.at();
        self.tables_mut().put_directory(record.clone(), at)?;
        debug!(branch, directory = %directory, "directory deleted");
        Ok(record)
    }

    /// Directory at `path` on `branch`, creating missing components.
    pub fn ensure_directory_path(&mut self, branch: &str, path: &str) -> OverlayResult<DirectoryId> {
        let chain = self.writable_chain(branch)?;
        let mut cursor = ROOT_DIRECTORY;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let existing = self
                .namespace(&chain)?
                .child_directories(cursor)?
                .into_iter()
                .find(|(_, name)| name == component)
                .map(|(id, _)| id);
            cursor = match existing {
                Some(id) => id,
                None => self.add_directory(branch, cursor, component)?.directory_id,
            };
        }
        Ok(cursor)
    }

    /// Read-side helpers over the staged state.
    pub fn file_id_info(&self, branch: &str, file: FileId) -> OverlayResult<Option<FileIdInfo>> {
        let chain = self.overlay.chain(branch)?;
        self.namespace(&chain)?.file_info(file)
    }

    pub fn resolve_file(&self, branch: &str, path: &str) -> OverlayResult<FileRecord> {
        let chain = self.overlay.chain(branch)?;
        self.namespace(&chain)?.resolve_file(ROOT_DIRECTORY, path)
    }

    pub fn directory_contents(&self, branch: &str, directory: DirectoryId) -> OverlayResult<DirectoryContents> {
        let chain = self.overlay.chain(branch)?;
        self.namespace(&chain)?.contents(directory)
    }

    pub fn resolve_directory(&self, branch: &str, path: &str) -> OverlayResult<DirectoryId> {
        let chain = self.overlay.chain(branch)?;
        self.namespace(&chain)?.resolve_directory(ROOT_DIRECTORY, path)
    }

    pub fn directory_path(&self, branch: &str, directory: DirectoryId) -> OverlayResult<String> {
        let chain = self.overlay.chain(branch)?;
        self.namespace(&chain)?.directory_path(directory)
    }

    pub(crate) fn chain(&self, branch: &str) -> OverlayResult<Vec<Branch>> {
        self.overlay.chain(branch)
    }
}

impl<T: NamespaceTables> fmt::Debug for OverlayTransaction<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayTransaction").field("tx", &self.tx).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_branch::{BranchKind, TRUNK_NAME};

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    struct Fixture {
        overlay: DirectoryOverlay,
        src: DirectoryId,
        docs: DirectoryId,
        file: FileId,
    }

    /// Trunk with `src/main.c` and an empty `docs/`.
    fn fixture() -> Fixture {
        let registry = Arc::new(BranchRegistry::new());
        let overlay = DirectoryOverlay::in_memory(registry).unwrap();
        let src = overlay.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "src", at(1)).unwrap().directory_id;
        let docs = overlay.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "docs", at(1)).unwrap().directory_id;
        let file = overlay.allocate_file_id().unwrap();
        overlay.add_file_to_branch(TRUNK_NAME, src, file, "main.c", at(2)).unwrap();
        Fixture {
            overlay,
            src,
            docs,
            file,
        }
    }

    impl Fixture {
        fn branch(&self, name: &str, kind: BranchKind, created: i64) {
            self.overlay
                .registry()
                .create_branch(name, kind, TRUNK_NAME, at(created))
                .unwrap();
        }

        fn location(&self, branch: &str) -> (DirectoryId, String) {
            let info = self.overlay.file_id_info(branch, self.file).unwrap().unwrap();
            (info.directory_id, info.name)
        }
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("main.c").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "tab\there"] {
            assert!(matches!(validate_name(bad), Err(OverlayError::InvalidName { .. })), "{bad:?}");
        }
    }

    #[test]
    fn reserved_directories_exist() {
        let fx = fixture();
        let top = fx.overlay.get_directory_id_collection_for_branch(TRUNK_NAME, ROOT_DIRECTORY).unwrap();
        assert_eq!(top.values().cloned().collect::<Vec<_>>(), vec!["src", "docs"]);
        assert!(fx.overlay.cemetery_contents(TRUNK_NAME).unwrap().is_empty());
        assert_eq!(fx.overlay.directory_path(TRUNK_NAME, fx.src).unwrap(), "src");
        assert_eq!(
            fx.overlay.directory_path(TRUNK_NAME, CEMETERY_DIRECTORY).unwrap(),
            DEFAULT_CEMETERY_DIR
        );
    }

    #[test]
    fn unknown_branch_is_reported() {
        let fx = fixture();
        let err = fx
            .overlay
            .add_file_to_branch("ghost", fx.src, FileId::new(99), "x.c", at(3))
            .unwrap_err();
        assert!(matches!(err, OverlayError::BranchNotFound { name } if name == "ghost"));
        assert!(matches!(
            fx.overlay.directory_contents("ghost", fx.src),
            Err(OverlayError::BranchNotFound { .. })
        ));
    }

    #[test]
    fn branch_addition_stays_on_branch() {
        let fx = fixture();
        fx.branch("dev", BranchKind::Feature, 3);
        fx.branch("other", BranchKind::Translucent, 3);
        let added = fx.overlay.allocate_file_id().unwrap();
        fx.overlay.add_file_to_branch("dev", fx.src, added, "util.c", at(4)).unwrap();

        assert!(fx.overlay.directory_contents("dev", fx.src).unwrap().files.contains_key(&added));
        assert!(!fx.overlay.directory_contents(TRUNK_NAME, fx.src).unwrap().files.contains_key(&added));
        assert!(!fx.overlay.directory_contents("other", fx.src).unwrap().files.contains_key(&added));
    }

    #[test]
    fn duplicate_names_and_files_rejected() {
        let fx = fixture();
        let other = fx.overlay.allocate_file_id().unwrap();
        assert!(matches!(
            fx.overlay.add_file_to_branch(TRUNK_NAME, fx.src, other, "main.c", at(3)),
            Err(OverlayError::NameConflict { .. })
        ));
        assert!(matches!(
            fx.overlay.add_file_to_branch(TRUNK_NAME, fx.docs, fx.file, "again.c", at(3)),
            Err(OverlayError::FileExists { .. })
        ));
        assert!(matches!(
            fx.overlay.add_file_to_branch(TRUNK_NAME, CEMETERY_DIRECTORY, other, "x.c", at(3)),
            Err(OverlayError::NotSupported { .. })
        ));
    }

    #[test]
    fn rename_checks_current_name() {
        let fx = fixture();
        let err = fx
            .overlay
            .rename_file_on_branch(TRUNK_NAME, fx.file, "wrong.c", "new.c", at(3))
            .unwrap_err();
        assert!(matches!(err, OverlayError::NameMismatch { ref actual, .. } if actual == "main.c"));
        fx.overlay
            .rename_file_on_branch(TRUNK_NAME, fx.file, "main.c", "entry.c", at(3))
            .unwrap();
        assert_eq!(fx.location(TRUNK_NAME), (fx.src, "entry.c".to_string()));
    }

    #[test]
    fn move_checks_origin() {
        let fx = fixture();
        assert!(matches!(
            fx.overlay.move_file_on_branch(TRUNK_NAME, fx.docs, fx.src, fx.file, at(3)),
            Err(OverlayError::DirectoryMismatch { .. })
        ));
        fx.overlay
            .move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, fx.file, at(3))
            .unwrap();
        assert_eq!(fx.location(TRUNK_NAME).0, fx.docs);
        let info = fx.overlay.file_id_info(TRUNK_NAME, fx.file).unwrap().unwrap();
        assert_eq!(info.path, "docs/main.c");
    }

    #[test]
    fn branch_move_is_isolated() {
        let fx = fixture();
        fx.branch("dev", BranchKind::Feature, 3);
        fx.branch("qa", BranchKind::Translucent, 3);
        fx.overlay.move_file_on_branch("dev", fx.src, fx.docs, fx.file, at(4)).unwrap();

        assert_eq!(fx.location("dev").0, fx.docs);
        assert_eq!(fx.location(TRUNK_NAME).0, fx.src);
        assert_eq!(fx.location("qa").0, fx.src);
    }

    #[test]
    fn trunk_changes_flow_into_untouched_files_only() {
        let fx = fixture();
        let second = fx.overlay.allocate_file_id().unwrap();
        fx.overlay.add_file_to_branch(TRUNK_NAME, fx.src, second, "lib.c", at(2)).unwrap();
        fx.branch("dev", BranchKind::Translucent, 3);

        // Branch renames one file, then trunk moves both.
        fx.overlay
            .rename_file_on_branch("dev", second, "lib.c", "dev_lib.c", at(4))
            .unwrap();
        fx.overlay.move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, fx.file, at(5)).unwrap();
        fx.overlay.move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, second, at(5)).unwrap();

        assert_eq!(fx.location("dev").0, fx.docs);
        let second_on_dev = fx.overlay.file_id_info("dev", second).unwrap().unwrap();
        assert_eq!(second_on_dev.directory_id, fx.src);
        assert_eq!(second_on_dev.name, "dev_lib.c");
    }

    #[test]
    fn read_only_branch_rejects_changes() {
        let fx = fixture();
        fx.overlay
            .registry()
            .create_branch("snap", BranchKind::DateBased { as_of: at(2) }, TRUNK_NAME, at(3))
            .unwrap();
        assert!(matches!(
            fx.overlay.move_file_on_branch("snap", fx.src, fx.docs, fx.file, at(4)),
            Err(OverlayError::ReadOnly { .. })
        ));
    }

    #[test]
    fn date_based_branch_sees_namespace_as_of_date() {
        let fx = fixture();
        fx.overlay.move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, fx.file, at(10)).unwrap();
        let new_dir = fx.overlay.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "later", at(11)).unwrap();
        fx.overlay
            .registry()
            .create_branch("snap", BranchKind::DateBased { as_of: at(5) }, TRUNK_NAME, at(20))
            .unwrap();

        assert_eq!(fx.location("snap").0, fx.src);
        let top = fx.overlay.get_directory_id_collection_for_branch("snap", ROOT_DIRECTORY).unwrap();
        assert!(!top.contains_key(&new_dir.directory_id));
        assert!(fx
            .overlay
            .get_directory_id_collection_for_branch(TRUNK_NAME, ROOT_DIRECTORY)
            .unwrap()
            .contains_key(&new_dir.directory_id));
    }

    #[test]
    fn delete_and_restore_on_branch() {
        let fx = fixture();
        fx.branch("dev", BranchKind::Feature, 3);
        let entry = fx.overlay.delete_file_from_branch("dev", fx.src, fx.file, "main.c", at(4)).unwrap();
        assert!(entry.deleted);
        assert_eq!(entry.name, cemetery_name(fx.file));

        assert!(fx.overlay.directory_contents("dev", fx.src).unwrap().files.is_empty());
        assert_eq!(
            fx.overlay.cemetery_contents("dev").unwrap().files.get(&fx.file),
            Some(&cemetery_name(fx.file))
        );
        assert!(fx.overlay.cemetery_contents(TRUNK_NAME).unwrap().files.is_empty());
        assert!(fx.overlay.directory_contents(TRUNK_NAME, fx.src).unwrap().files.contains_key(&fx.file));

        fx.overlay.move_file_from_cemetery("dev", fx.src, fx.file, "main.c", at(5)).unwrap();
        assert_eq!(fx.location("dev"), (fx.src, "main.c".to_string()));
        // Back in its original place, the branch follows the trunk again.
        fx.overlay.move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, fx.file, at(6)).unwrap();
        assert_eq!(fx.location("dev").0, fx.docs);
    }

    #[test]
    fn restore_requires_cemetery() {
        let fx = fixture();
        assert!(matches!(
            fx.overlay.move_file_from_cemetery(TRUNK_NAME, fx.src, fx.file, "main.c", at(3)),
            Err(OverlayError::NotInCemetery { .. })
        ));
    }

    #[test]
    fn directory_delete_needs_empty_directory() {
        let fx = fixture();
        assert!(matches!(
            fx.overlay.delete_directory(TRUNK_NAME, fx.src, at(3)),
            Err(OverlayError::DirectoryNotEmpty { .. })
        ));
        assert!(matches!(
            fx.overlay.delete_directory(TRUNK_NAME, ROOT_DIRECTORY, at(3)),
            Err(OverlayError::NotSupported { .. })
        ));
        fx.branch("dev", BranchKind::Feature, 3);
        fx.overlay.delete_directory("dev", fx.docs, at(4)).unwrap();
        assert!(!fx
            .overlay
            .get_directory_id_collection_for_branch("dev", ROOT_DIRECTORY)
            .unwrap()
            .contains_key(&fx.docs));
        assert!(fx
            .overlay
            .get_directory_id_collection_for_branch(TRUNK_NAME, ROOT_DIRECTORY)
            .unwrap()
            .contains_key(&fx.docs));
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let fx = fixture();
        let result: OverlayResult<()> = fx.overlay.transaction(at(3), |tx| {
            tx.move_file_on_branch(TRUNK_NAME, fx.src, fx.docs, fx.file)?;
            tx.rename_file_on_branch(TRUNK_NAME, fx.file, "nope.c", "x.c")?;
            Ok(())
        });
        assert!(matches!(result, Err(OverlayError::NameMismatch { .. })));
        assert_eq!(fx.location(TRUNK_NAME), (fx.src, "main.c".to_string()));
    }

    #[test]
    fn ensure_directory_path_creates_missing_parts() {
        let fx = fixture();
        let mut tx = fx.overlay.begin(at(3)).unwrap();
        let deep = tx.ensure_directory_path(TRUNK_NAME, "src/net/http").unwrap();
        let again = tx.ensure_directory_path(TRUNK_NAME, "src/net/http").unwrap();
        assert_eq!(deep, again);
        tx.commit();
        assert_eq!(fx.overlay.directory_path(TRUNK_NAME, deep).unwrap(), "src/net/http");
        assert_eq!(fx.overlay.resolve_directory(TRUNK_NAME, "src/net").unwrap(), {
            let contents = fx.overlay.directory_contents(TRUNK_NAME, fx.src).unwrap();
            contents.directory_named("net").unwrap()
        });
        assert_eq!(fx.overlay.resolve_file(TRUNK_NAME, "src/main.c").unwrap().file_id, fx.file);
    }

    #[test]
    fn allocators_resume_after_existing_rows() {
        let fx = fixture();
        let tables = fx.overlay.store().snapshot().unwrap();
        let reopened = DirectoryOverlay::new(Arc::clone(fx.overlay.registry()), tables, DEFAULT_CEMETERY_DIR).unwrap();
        assert!(reopened.allocate_file_id().unwrap() > fx.file);
        let dir = reopened.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "new", at(9)).unwrap();
        assert!(dir.directory_id > fx.docs);
    }
}
