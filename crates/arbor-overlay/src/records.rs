//! Rows of the namespace tables and the views built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use arbor_types::{BranchId, DirectoryId, FileId, Timestamp};

/// Where a file lives on one branch.
///
/// A branch only carries a row for files it has touched itself; everything
/// else is inherited from its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub branch_id: BranchId,
    pub directory_id: DirectoryId,
    pub name: String,
    /// The file sits in the cemetery under its cemetery name.
    pub deleted: bool,
}

/// A directory as seen on one branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub directory_id: DirectoryId,
    pub branch_id: BranchId,
    /// `None` for the project root and the cemetery.
    pub parent: Option<DirectoryId>,
    pub name: String,
    pub deleted: bool,
}

/// A row together with the interval it was current for.
///
/// Current rows have no `valid_to`; history rows always do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<R> {
    pub record: R,
    pub valid_from: Timestamp,
    pub valid_to: Option<Timestamp>,
}

impl<R> Versioned<R> {
    pub fn current(record: R, valid_from: Timestamp) -> Self {
        Self {
            record,
            valid_from,
            valid_to: None,
        }
    }

    /// Whether the row was the current one at `at`.
    pub fn covers(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |end| at < end)
    }
}

/// Files and child directories of one directory on one branch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryContents {
    pub directory_id: DirectoryId,
    pub files: BTreeMap<FileId, String>,
    pub directories: BTreeMap<DirectoryId, String>,
}

impl DirectoryContents {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    pub fn file_named(&self, name: &str) -> Option<FileId> {
        self.files.iter().find(|(_, n)| n.as_str() == name).map(|(id, _)| *id)
    }

    pub fn directory_named(&self, name: &str) -> Option<DirectoryId> {
        self.directories
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }

    /// Whether a file or directory already uses `name`.
    pub fn is_taken(&self, name: &str) -> bool {
        self.file_named(name).is_some() || self.directory_named(name).is_some()
    }
}

/// Entry of the file-id dictionary: where a file currently lives on a branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdInfo {
    pub file_id: FileId,
    pub branch_id: BranchId,
    pub directory_id: DirectoryId,
    pub name: String,
    pub deleted: bool,
    /// Project-relative path of the file on the branch.
    pub path: String,
}
