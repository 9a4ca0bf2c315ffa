//! Everything the dispatcher needs to serve one project.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use arbor_archive::{
    parse_cemetery_name, workfile_path, ArchiveRepository, ArchiveStore, FsArchiveStore, InMemoryArchiveStore,
};
use arbor_branch::{BranchRegistry, TRUNK_NAME};
use arbor_overlay::{DirectoryOverlay, InMemoryTables, ROOT_DIRECTORY};
use arbor_types::Timestamp;

use crate::config::{ServerConfig, StorageBackend};
use crate::error::{ServerError, ServerResult};

const BRANCHES_FILE: &str = "branches.json";
const NAMESPACE_FILE: &str = "namespace.json";

/// The archives, branches and namespace of one project.
pub struct Project {
    config: ServerConfig,
    repository: ArchiveRepository,
    overlay: DirectoryOverlay,
    save_lock: Mutex<()>,
}

impl Project {
    /// Open the project `config` describes.
    ///
    /// Branch and namespace state is loaded from `state_dir` when it holds
    /// any; otherwise the trunk namespace is rebuilt from the stored
    /// archives.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let store: Arc<dyn ArchiveStore> = match config.storage {
            StorageBackend::Memory => Arc::new(InMemoryArchiveStore::new()),
            StorageBackend::Filesystem => Arc::new(FsArchiveStore::open(&config.archive_root)?),
        };
        let repository = ArchiveRepository::with_cemetery_dir(store, config.cemetery_dir.clone());

        let saved = match &config.state_dir {
            Some(dir) => load_state(dir)?,
            None => None,
        };
        let project = match saved {
            Some((registry, tables)) => {
                let overlay = DirectoryOverlay::new(Arc::new(registry), tables, &config.cemetery_dir)?;
                info!(project = %config.project, "project state loaded");
                Self::assemble(config, repository, overlay)
            }
            None => {
                let overlay = DirectoryOverlay::new(
                    Arc::new(BranchRegistry::new()),
                    InMemoryTables::new(),
                    &config.cemetery_dir,
                )?;
                let project = Self::assemble(config, repository, overlay);
                project.index_archives()?;
                project
            }
        };
        project.reserve_stored_ids()?;
        Ok(project)
    }

    fn assemble(config: ServerConfig, repository: ArchiveRepository, overlay: DirectoryOverlay) -> Self {
        Self {
            config,
            repository,
            overlay,
            save_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn repository(&self) -> &ArchiveRepository {
        &self.repository
    }

    pub fn overlay(&self) -> &DirectoryOverlay {
        &self.overlay
    }

    pub fn registry(&self) -> &Arc<BranchRegistry> {
        self.overlay.registry()
    }

    /// Archive path for a file created at `path` on `branch`. Trunk files
    /// are stored under their path; files born on a branch live below the
    /// branch archive directory until the trunk adopts them.
    pub fn archive_path_for(&self, branch: &str, path: &str) -> String {
        if branch == TRUNK_NAME {
            path.to_string()
        } else {
            format!("{}/{branch}/{path}", self.config.branch_archive_dir)
        }
    }

    fn is_branch_archive(&self, key: &str) -> bool {
        key.starts_with(&format!("{}/", self.config.branch_archive_dir))
    }

    /// Register every trunk archive, live or deleted, in the trunk namespace.
    fn index_archives(&self) -> ServerResult<()> {
        let cemetery_prefix = format!("{}/", self.config.cemetery_dir);
        let mut indexed = 0usize;
        for key in self.repository.store().keys()? {
            if self.is_branch_archive(&key) {
                continue;
            }
            if let Some(name) = key.strip_prefix(&cemetery_prefix) {
                let Some(file_id) = parse_cemetery_name(name) else {
                    continue;
                };
                let at = self.created_at(&key)?;
                self.overlay.transaction(at, |tx| -> ServerResult<()> {
                    tx.add_file_to_branch(TRUNK_NAME, ROOT_DIRECTORY, file_id, name)?;
                    tx.delete_file_from_branch(TRUNK_NAME, ROOT_DIRECTORY, file_id, name)?;
                    Ok(())
                })?;
                indexed += 1;
                continue;
            }
            let Some(path) = workfile_path(&key) else {
                continue;
            };
            let file = self.repository.open_key(&key)?;
            let file_id = file.read(|a| a.file_id())?;
            let at = self.created_at(&key)?;
            let (dir_path, name) = path.rsplit_once('/').unwrap_or(("", path));
            self.overlay.transaction(at, |tx| -> ServerResult<()> {
                let directory = tx.ensure_directory_path(TRUNK_NAME, dir_path)?;
                tx.add_file_to_branch(TRUNK_NAME, directory, file_id, name)?;
                Ok(())
            })?;
            indexed += 1;
        }
        info!(project = %self.config.project, indexed, "trunk namespace rebuilt from archives");
        Ok(())
    }

    /// When the archive under `key` got its first revision.
    fn created_at(&self, key: &str) -> ServerResult<Timestamp> {
        let file = self.repository.open_key(key)?;
        Ok(file.read(|a| a.nodes().iter().map(|n| n.check_in_time).min().unwrap_or_default())?)
    }

    /// Keep file ids of every stored archive out of the allocator, including
    /// archives the namespace does not know about.
    fn reserve_stored_ids(&self) -> ServerResult<()> {
        for key in self.repository.store().keys()? {
            match self.repository.open_key(&key) {
                Ok(file) => self.overlay.reserve_file_id(file.read(|a| a.file_id())?),
                Err(e) if e.is_fatal() => warn!(key = %key, error = %e, "skipping unreadable archive"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write branch and namespace state to `state_dir`, if configured.
    pub fn save(&self) -> ServerResult<()> {
        let Some(dir) = &self.config.state_dir else {
            return Ok(());
        };
        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| ServerError::Config("state save lock poisoned".into()))?;
        std::fs::create_dir_all(dir)?;
        let branches = self.registry().to_json()?;
        let namespace = self.overlay.store().snapshot()?.to_json()?;
        write_atomically(&dir.join(BRANCHES_FILE), branches.as_bytes())?;
        write_atomically(&dir.join(NAMESPACE_FILE), namespace.as_bytes())?;
        debug!(dir = %dir.display(), "project state saved");
        Ok(())
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("project", &self.config.project)
            .field("storage", &self.config.storage)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

fn load_state(dir: &Path) -> ServerResult<Option<(BranchRegistry, InMemoryTables)>> {
    let branches = dir.join(BRANCHES_FILE);
    let namespace = dir.join(NAMESPACE_FILE);
    if !branches.is_file() || !namespace.is_file() {
        return Ok(None);
    }
    let registry = BranchRegistry::from_json(&std::fs::read_to_string(&branches)?)?;
    let tables = InMemoryTables::from_json(&std::fs::read_to_string(&namespace)?)?;
    Ok(Some((registry, tables)))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> ServerResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| ServerError::Config(format!("{} has no parent directory", path.display())))?;
    let mut staging = NamedTempFile::new_in(parent)?;
    staging.write_all(bytes)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| ServerError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_archive::CreateArchive;
    use arbor_types::FileId;

    fn fs_config(root: &Path) -> ServerConfig {
        ServerConfig {
            archive_root: root.join("archives"),
            ..ServerConfig::default()
        }
    }

    fn params(id: u32, name: &str) -> CreateArchive {
        let mut p = CreateArchive::new(FileId::new(id), name, "alice");
        p.timestamp = Timestamp::from_millis(1_000);
        p
    }

    #[test]
    fn memory_project_starts_empty() {
        let project = Project::open(ServerConfig::in_memory("demo")).unwrap();
        assert!(project.overlay().files_on_branch(TRUNK_NAME).unwrap().is_empty());
        assert_eq!(project.archive_path_for(TRUNK_NAME, "a.c"), "a.c");
        assert_eq!(project.archive_path_for("dev", "a.c"), ".branch-archives/dev/a.c");
        project.save().unwrap();
    }

    #[test]
    fn trunk_namespace_rebuilt_from_archives() {
        let dir = tempfile::tempdir().unwrap();
        let config = fs_config(dir.path());
        {
            let store = Arc::new(FsArchiveStore::open(&config.archive_root).unwrap());
            let repo = ArchiveRepository::new(store);
            repo.create_archive("src/main.c", params(7, "main.c"), b"int x;\n").unwrap();
            repo.create_archive("README", params(3, "README"), b"hi\n").unwrap();
            repo.create_archive("old.c", params(9, "old.c"), b"gone\n").unwrap();
            repo.delete_archive("alice", "old.c", Timestamp::from_millis(2_000)).unwrap();
        }

        let project = Project::open(config).unwrap();
        let record = project.overlay().resolve_file(TRUNK_NAME, "src/main.c").unwrap();
        assert_eq!(record.file_id, FileId::new(7));
        let paths: Vec<_> = project
            .overlay()
            .files_on_branch(TRUNK_NAME)
            .unwrap()
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(paths, vec!["README".to_string(), "src/main.c".to_string()]);
        assert!(project
            .overlay()
            .cemetery_contents(TRUNK_NAME)
            .unwrap()
            .files
            .contains_key(&FileId::new(9)));
        assert!(project.overlay().allocate_file_id().unwrap().get() > 9);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            state_dir: Some(dir.path().join("state")),
            ..fs_config(dir.path())
        };
        {
            let project = Project::open(config.clone()).unwrap();
            project
                .registry()
                .create_branch("dev", arbor_branch::BranchKind::Feature, TRUNK_NAME, Timestamp::from_millis(5))
                .unwrap();
            let id = project.overlay().allocate_file_id().unwrap();
            project
                .overlay()
                .add_file_to_branch("dev", ROOT_DIRECTORY, id, "notes.txt", Timestamp::from_millis(6))
                .unwrap();
            project.save().unwrap();
        }

        let project = Project::open(config).unwrap();
        assert!(project.registry().find("dev").unwrap().is_some());
        assert_eq!(project.overlay().resolve_file("dev", "notes.txt").unwrap().name, "notes.txt");
        assert!(project.overlay().resolve_file(TRUNK_NAME, "notes.txt").is_err());
    }
}
