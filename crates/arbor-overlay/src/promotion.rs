//! Carrying a branch's namespace changes up to its parent.

use serde::{Deserialize, Serialize};
use tracing::info;

use arbor_branch::Branch;
use arbor_types::{FileId, Timestamp};

use crate::error::{OverlayError, OverlayResult};
use crate::namespace::Namespace;
use crate::overlay::{chain_of, DirectoryOverlay, OverlayTransaction};
use crate::records::FileRecord;
use crate::tables::NamespaceTables;

/// How a branch's view of a file differs from its parent's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    Added,
    Deleted,
    Restored,
    Moved,
    Renamed,
    MovedAndRenamed,
}

impl PromotionKind {
    /// Compare the branch's record with the parent's. `None` when they agree.
    pub fn classify(branch: &FileRecord, parent: Option<&FileRecord>) -> Option<Self> {
        let Some(parent) = parent else {
            return (!branch.deleted).then_some(PromotionKind::Added);
        };
        match (branch.deleted, parent.deleted) {
            (true, true) => None,
            (true, false) => Some(PromotionKind::Deleted),
            (false, true) => Some(PromotionKind::Restored),
            (false, false) => {
                let moved = branch.directory_id != parent.directory_id;
                let renamed = branch.name != parent.name;
                match (moved, renamed) {
                    (true, true) => Some(PromotionKind::MovedAndRenamed),
                    (true, false) => Some(PromotionKind::Moved),
                    (false, true) => Some(PromotionKind::Renamed),
                    (false, false) => None,
                }
            }
        }
    }
}

/// A file whose location on a branch differs from its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCandidate {
    pub file_id: FileId,
    pub kind: PromotionKind,
    pub branch_record: FileRecord,
    pub parent_record: Option<FileRecord>,
}

impl<T: NamespaceTables> DirectoryOverlay<T> {
    /// Files `branch` has changed relative to its parent's current namespace.
    pub fn promotion_candidates(&self, branch: &str) -> OverlayResult<Vec<PromotionCandidate>> {
        let chain = chain_of(self.registry(), branch)?;
        let tables = self.store().read()?;
        candidates(&*tables, &chain)
    }

    /// Apply `branch`'s view of `file` to its parent.
    pub fn promote_file(&self, branch: &str, file: FileId, at: Timestamp) -> OverlayResult<FileRecord> {
        self.transaction(at, |tx| tx.promote_file(branch, file))
    }
}

impl<T: NamespaceTables> OverlayTransaction<'_, T> {
    pub fn promotion_candidates(&self, branch: &str) -> OverlayResult<Vec<PromotionCandidate>> {
        let chain = self.chain(branch)?;
        candidates(self.tables(), &chain)
    }

    /// Write the branch's record of `file` into the parent branch. The
    /// branch then inherits the promoted location.
    pub fn promote_file(&mut self, branch: &str, file: FileId) -> OverlayResult<FileRecord> {
        let chain = self.writable_chain(branch)?;
        if chain[0].is_trunk() {
            return Err(OverlayError::NotSupported {
                operation: "promote".into(),
                branch: branch.to_string(),
            });
        }
        let parent_chain = &chain[1..];
        let nothing = || OverlayError::NothingToPromote {
            file,
            branch: branch.to_string(),
        };

        let own = self.tables().find_file(chain[0].id, file)?.ok_or_else(nothing)?;
        let parent = self.namespace(parent_chain)?.file(file)?;
        let kind = PromotionKind::classify(&own, parent.as_ref()).ok_or_else(nothing)?;

        if !own.deleted {
            let parent_ns = self.namespace(parent_chain)?;
            parent_ns.live_directory(own.directory_id)?;
            let clash = parent_ns
                .contents(own.directory_id)?
                .files
                .into_iter()
                .any(|(id, name)| id != file && name == own.name);
            if clash {
                return Err(OverlayError::NameConflict {
                    directory: own.directory_id,
                    name: own.name.clone(),
                });
            }
        }

        let promoted = FileRecord {
            branch_id: parent_chain[0].id,
            ..own.clone()
        };
        self.write_file(parent_chain, promoted.clone())?;
        self.write_file(&chain, own)?;
        info!(branch, parent = %parent_chain[0].name, file = %file, ?kind, "file promoted");
        Ok(promoted)
    }
}

fn candidates<T: NamespaceTables>(tables: &T, chain: &[Branch]) -> OverlayResult<Vec<PromotionCandidate>> {
    if chain.len() < 2 {
        return Ok(Vec::new());
    }
    let parent_ns = Namespace::new(tables, &chain[1..])?;
    let mut found = Vec::new();
    for id in tables.file_ids(chain[0].id)? {
        let Some(own) = tables.find_file(chain[0].id, id)? else {
            continue;
        };
        let parent = parent_ns.file(id)?;
        if let Some(kind) = PromotionKind::classify(&own, parent.as_ref()) {
            found.push(PromotionCandidate {
                file_id: id,
                kind,
                branch_record: own,
                parent_record: parent,
            });
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::ROOT_DIRECTORY;
    use arbor_branch::{BranchKind, BranchRegistry, TRUNK_NAME};
    use arbor_types::{BranchId, DirectoryId};
    use std::sync::Arc;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn record(dir: u32, name: &str, deleted: bool) -> FileRecord {
        FileRecord {
            file_id: FileId::new(1),
            branch_id: BranchId::new(2),
            directory_id: DirectoryId::new(dir),
            name: name.to_string(),
            deleted,
        }
    }

    #[test]
    fn classify_differences() {
        let base = record(3, "a.c", false);
        assert_eq!(PromotionKind::classify(&base, None), Some(PromotionKind::Added));
        assert_eq!(PromotionKind::classify(&base, Some(&base)), None);
        assert_eq!(
            PromotionKind::classify(&record(4, "a.c", false), Some(&base)),
            Some(PromotionKind::Moved)
        );
        assert_eq!(
            PromotionKind::classify(&record(3, "b.c", false), Some(&base)),
            Some(PromotionKind::Renamed)
        );
        assert_eq!(
            PromotionKind::classify(&record(4, "b.c", false), Some(&base)),
            Some(PromotionKind::MovedAndRenamed)
        );
        assert_eq!(
            PromotionKind::classify(&record(2, "x", true), Some(&base)),
            Some(PromotionKind::Deleted)
        );
        assert_eq!(
            PromotionKind::classify(&base, Some(&record(2, "x", true))),
            Some(PromotionKind::Restored)
        );
        assert_eq!(PromotionKind::classify(&record(2, "x", true), None), None);
    }

    #[test]
    fn promote_moves_change_to_parent() {
        let overlay = DirectoryOverlay::in_memory(Arc::new(BranchRegistry::new())).unwrap();
        let src = overlay.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "src", at(1)).unwrap().directory_id;
        let lib = overlay.add_directory(TRUNK_NAME, ROOT_DIRECTORY, "lib", at(1)).unwrap().directory_id;
        let file = overlay.allocate_file_id().unwrap();
        overlay.add_file_to_branch(TRUNK_NAME, src, file, "a.c", at(2)).unwrap();
        overlay
            .registry()
            .create_branch("dev", BranchKind::Feature, TRUNK_NAME, at(3))
            .unwrap();
        overlay.move_file_on_branch("dev", src, lib, file, at(4)).unwrap();

        let candidates = overlay.promotion_candidates("dev").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, PromotionKind::Moved);
        assert!(overlay.promotion_candidates(TRUNK_NAME).unwrap().is_empty());

        let promoted = overlay.promote_file("dev", file, at(5)).unwrap();
        assert_eq!(promoted.branch_id, BranchId::TRUNK);
        assert_eq!(overlay.file_id_info(TRUNK_NAME, file).unwrap().unwrap().directory_id, lib);
        assert!(overlay.promotion_candidates("dev").unwrap().is_empty());
        assert!(matches!(
            overlay.promote_file("dev", file, at(6)),
            Err(OverlayError::NothingToPromote { .. })
        ));
    }

    #[test]
    fn promote_branch_addition() {
        let overlay = DirectoryOverlay::in_memory(Arc::new(BranchRegistry::new())).unwrap();
        overlay
            .registry()
            .create_branch("dev", BranchKind::Translucent, TRUNK_NAME, at(1))
            .unwrap();
        let file = overlay.allocate_file_id().unwrap();
        overlay.add_file_to_branch("dev", ROOT_DIRECTORY, file, "new.c", at(2)).unwrap();
        assert_eq!(overlay.promotion_candidates("dev").unwrap()[0].kind, PromotionKind::Added);

        overlay.promote_file("dev", file, at(3)).unwrap();
        let contents = overlay.directory_contents(TRUNK_NAME, ROOT_DIRECTORY).unwrap();
        assert_eq!(contents.files.get(&file).map(String::as_str), Some("new.c"));
    }

    #[test]
    fn trunk_cannot_promote() {
        let overlay = DirectoryOverlay::in_memory(Arc::new(BranchRegistry::new())).unwrap();
        assert!(matches!(
            overlay.promote_file(TRUNK_NAME, FileId::new(1), at(1)),
            Err(OverlayError::NotSupported { .. })
        ));
    }
}
