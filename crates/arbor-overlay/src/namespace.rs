//! What a branch's namespace looks like.
//!
//! A branch sees its own row for a file or directory when it has one and
//! inherits its parent's view otherwise. Opaque branches inherit their
//! parent's namespace as it stood when they were created; date-based
//! branches inherit it as of their date, read from current rows plus
//! history.

use std::collections::{BTreeMap, BTreeSet};

use arbor_branch::{Branch, BranchKind};
use arbor_types::{BranchId, DirectoryId, FileId, Timestamp};

use crate::error::{OverlayError, OverlayResult};
use crate::records::{DirectoryContents, DirectoryRecord, FileIdInfo, FileRecord};
use crate::tables::NamespaceTables;

/// Longest directory chain followed when building a path.
const MAX_DEPTH: usize = 256;

/// One level of a branch's ancestry and the instant it is read at.
#[derive(Clone, Copy, Debug)]
struct Layer {
    branch: BranchId,
    as_of: Option<Timestamp>,
}

/// Read-only projection of the tables onto one branch.
pub struct Namespace<'a, T> {
    tables: &'a T,
    branch: &'a Branch,
    layers: Vec<Layer>,
}

impl<'a, T: NamespaceTables> Namespace<'a, T> {
    /// `chain` is the branch followed by its ancestors, ending at the trunk.
    pub fn new(tables: &'a T, chain: &'a [Branch]) -> OverlayResult<Self> {
        let branch = chain.first().ok_or_else(|| OverlayError::BranchNotFound {
            name: "<empty ancestry>".into(),
        })?;
        let mut layers = Vec::with_capacity(chain.len());
        let mut as_of: Option<Timestamp> = None;
        for link in chain {
            let limit = match link.kind {
                BranchKind::DateBased { as_of } => Some(as_of),
                _ => None,
            };
            let read_at = earliest(as_of, limit);
            layers.push(Layer {
                branch: link.id,
                as_of: read_at,
            });
            let parent_limit = match link.kind {
                BranchKind::Opaque => Some(link.created_at),
                _ => None,
            };
            as_of = earliest(read_at, parent_limit);
        }
        Ok(Self { tables, branch, layers })
    }

    pub fn branch(&self) -> &Branch {
        self.branch
    }

    /// The record deciding where `file` lives on this branch, if any.
    pub fn file(&self, file: FileId) -> OverlayResult<Option<FileRecord>> {
        for layer in &self.layers {
            let row = match layer.as_of {
                None => self.tables.find_file(layer.branch, file)?,
                Some(at) => self.tables.file_as_of(layer.branch, file, at)?,
            };
            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }

    pub fn directory(&self, directory: DirectoryId) -> OverlayResult<Option<DirectoryRecord>> {
        for layer in &self.layers {
            let row = match layer.as_of {
                None => self.tables.find_directory(layer.branch, directory)?,
                Some(at) => self.tables.directory_as_of(layer.branch, directory, at)?,
            };
            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }

    /// What the branch would see for `file` without a row of its own.
    pub fn inherited_file(&self, file: FileId) -> OverlayResult<Option<FileRecord>> {
        for layer in self.layers.iter().skip(1) {
            let row = match layer.as_of {
                None => self.tables.find_file(layer.branch, file)?,
                Some(at) => self.tables.file_as_of(layer.branch, file, at)?,
            };
            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }

    /// Whether this branch holds a row of its own for `file`.
    pub fn overrides_file(&self, file: FileId) -> OverlayResult<bool> {
        Ok(self.tables.find_file(self.branch.id, file)?.is_some())
    }

    /// The visible, non-deleted directory `directory`.
    pub fn live_directory(&self, directory: DirectoryId) -> OverlayResult<DirectoryRecord> {
        match self.directory(directory)? {
            Some(record) if !record.deleted => Ok(record),
            _ => Err(OverlayError::DirectoryNotFound {
                directory,
                branch: self.branch.name.clone(),
            }),
        }
    }

    /// The visible record of `file`, deleted or not.
    pub fn existing_file(&self, file: FileId) -> OverlayResult<FileRecord> {
        self.file(file)?.ok_or_else(|| OverlayError::FileNotFound {
            file,
            branch: self.branch.name.clone(),
        })
    }

    fn candidate_files(&self) -> OverlayResult<BTreeSet<FileId>> {
        let mut ids = BTreeSet::new();
        for layer in &self.layers {
            ids.extend(self.tables.file_ids(layer.branch)?);
        }
        Ok(ids)
    }

    fn candidate_directories(&self) -> OverlayResult<BTreeSet<DirectoryId>> {
        let mut ids = BTreeSet::new();
        for layer in &self.layers {
            ids.extend(self.tables.directory_ids(layer.branch)?);
        }
        Ok(ids)
    }

    /// Every file visible on the branch, deleted ones included.
    pub fn files(&self) -> OverlayResult<Vec<FileRecord>> {
        let mut files = Vec::new();
        for id in self.candidate_files()? {
            if let Some(record) = self.file(id)? {
                files.push(record);
            }
        }
        Ok(files)
    }

    /// Files and live child directories of `directory`.
    pub fn contents(&self, directory: DirectoryId) -> OverlayResult<DirectoryContents> {
        self.live_directory(directory)?;
        let mut contents = DirectoryContents {
            directory_id: directory,
            ..DirectoryContents::default()
        };
        for record in self.files()? {
            if record.directory_id == directory {
                contents.files.insert(record.file_id, record.name);
            }
        }
        contents.directories = self.child_directories(directory)?;
        Ok(contents)
    }

    /// Live child directories of `directory`, id to name.
    pub fn child_directories(&self, directory: DirectoryId) -> OverlayResult<BTreeMap<DirectoryId, String>> {
        let mut children = BTreeMap::new();
        for id in self.candidate_directories()? {
            if let Some(record) = self.directory(id)? {
                if !record.deleted && record.parent == Some(directory) {
                    children.insert(id, record.name);
                }
            }
        }
        Ok(children)
    }

    /// Project-relative path of a live directory. The project root has an
    /// empty path; the cemetery's path is its own name.
    pub fn directory_path(&self, directory: DirectoryId) -> OverlayResult<String> {
        let mut names = Vec::new();
        let mut cursor = self.live_directory(directory)?;
        while let Some(parent) = cursor.parent {
            if names.len() >= MAX_DEPTH {
                return Err(OverlayError::DirectoryNotFound {
                    directory,
                    branch: self.branch.name.clone(),
                });
            }
            names.push(cursor.name);
            cursor = self.live_directory(parent)?;
        }
        if !cursor.name.is_empty() {
            names.push(cursor.name);
        }
        names.reverse();
        Ok(names.join("/"))
    }

    /// Follow `path` (`/`-separated directory names) down from `root`.
    pub fn resolve_directory(&self, root: DirectoryId, path: &str) -> OverlayResult<DirectoryId> {
        let mut cursor = root;
        self.live_directory(cursor)?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            cursor = self
                .child_directories(cursor)?
                .into_iter()
                .find(|(_, name)| name == component)
                .map(|(id, _)| id)
                .ok_or_else(|| OverlayError::PathNotFound {
                    path: path.to_string(),
                    branch: self.branch.name.clone(),
                })?;
        }
        Ok(cursor)
    }

    /// The file at `path` below `root`.
    pub fn resolve_file(&self, root: DirectoryId, path: &str) -> OverlayResult<FileRecord> {
        let not_found = || OverlayError::PathNotFound {
            path: path.to_string(),
            branch: self.branch.name.clone(),
        };
        let (dir_path, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        let directory = self.resolve_directory(root, dir_path)?;
        let file = self.contents(directory)?.file_named(name).ok_or_else(not_found)?;
        self.existing_file(file)
    }

    /// File-id dictionary entry for `file`.
    pub fn file_info(&self, file: FileId) -> OverlayResult<Option<FileIdInfo>> {
        let Some(record) = self.file(file)? else {
            return Ok(None);
        };
        let dir_path = self.directory_path(record.directory_id)?;
        let path = if dir_path.is_empty() {
            record.name.clone()
        } else {
            format!("{dir_path}/{}", record.name)
        };
        Ok(Some(FileIdInfo {
            file_id: file,
            branch_id: self.branch.id,
            directory_id: record.directory_id,
            name: record.name,
            deleted: record.deleted,
            path,
        }))
    }
}

fn earliest(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::InMemoryTables;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn branch(id: u32, kind: BranchKind, parent: Option<u32>, created: i64) -> Branch {
        Branch {
            id: BranchId::new(id),
            name: format!("b{id}"),
            kind,
            parent: parent.map(BranchId::new),
            created_at: at(created),
        }
    }

    fn row(branch: u32, dir: u32, name: &str) -> FileRecord {
        FileRecord {
            file_id: FileId::new(10),
            branch_id: BranchId::new(branch),
            directory_id: DirectoryId::new(dir),
            name: name.to_string(),
            deleted: false,
        }
    }

    #[test]
    fn own_row_shadows_parent() {
        let mut tables = InMemoryTables::new();
        tables.put_file(row(1, 1, "trunk.txt"), at(1)).unwrap();
        tables.put_file(row(2, 1, "branch.txt"), at(2)).unwrap();
        let chain = [branch(2, BranchKind::Feature, Some(1), 0), branch(1, BranchKind::Trunk, None, 0)];
        let ns = Namespace::new(&tables, &chain).unwrap();
        assert_eq!(ns.file(FileId::new(10)).unwrap().unwrap().name, "branch.txt");
        assert!(ns.overrides_file(FileId::new(10)).unwrap());
        let trunk_ns = Namespace::new(&tables, &chain[1..]).unwrap();
        assert_eq!(trunk_ns.file(FileId::new(10)).unwrap().unwrap().name, "trunk.txt");
    }

    #[test]
    fn opaque_branch_reads_parent_at_creation() {
        let mut tables = InMemoryTables::new();
        tables.put_file(row(1, 1, "old.txt"), at(1)).unwrap();
        tables.put_file(row(1, 1, "new.txt"), at(50)).unwrap();
        let chain = [branch(2, BranchKind::Opaque, Some(1), 10), branch(1, BranchKind::Trunk, None, 0)];
        let ns = Namespace::new(&tables, &chain).unwrap();
        assert_eq!(ns.file(FileId::new(10)).unwrap().unwrap().name, "old.txt");
    }

    #[test]
    fn date_based_child_of_opaque_uses_earliest_limit() {
        let mut tables = InMemoryTables::new();
        tables.put_file(row(1, 1, "v1.txt"), at(1)).unwrap();
        tables.put_file(row(1, 1, "v2.txt"), at(20)).unwrap();
        tables.put_file(row(1, 1, "v3.txt"), at(40)).unwrap();
        let chain = [
            branch(3, BranchKind::DateBased { as_of: at(60) }, Some(2), 70),
            branch(2, BranchKind::Opaque, Some(1), 30),
            branch(1, BranchKind::Trunk, None, 0),
        ];
        let ns = Namespace::new(&tables, &chain).unwrap();
        assert_eq!(ns.file(FileId::new(10)).unwrap().unwrap().name, "v2.txt");
    }
}
