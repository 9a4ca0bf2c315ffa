//! The per-branch view of one archive.

use std::sync::Arc;

use arbor_archive::{
    ArchiveAttributes, ArchiveFile, CheckInOptions, CheckInOutcome, CheckOut, LabelArgs, LogfileInfo,
    RevisionSelector,
};
use arbor_types::{ContentDigest, FileId, RevisionNumber, Timestamp};

use crate::date_based::DateBasedView;
use crate::error::BranchResult;
use crate::registry::{Branch, BranchRegistry};
use crate::writable::WritableBranchView;

/// One archive as seen from one branch.
///
/// Views are cheap projections computed on demand; nothing about them is
/// persisted. Writable views delegate mutations to the shared archive, so a
/// branch's revisions live inside the same revision tree as the trunk's.
/// Read-only views reject every mutation without side effects: boolean
/// operations return `Ok(false)`, the rest fail with `ReadOnly`.
pub trait BranchView: Send + Sync {
    fn branch(&self) -> &Branch;

    fn archive(&self) -> &Arc<ArchiveFile>;

    fn is_read_only(&self) -> bool;

    /// Archive metadata restricted to what this branch can see.
    fn logfile_info(&self) -> BranchResult<LogfileInfo>;

    /// Arena index of the revision `selector` addresses on this branch.
    fn revision_index(&self, selector: &RevisionSelector) -> BranchResult<usize>;

    /// Content of the revision `selector` addresses on this branch.
    /// `Default` is the branch's visible tip.
    fn get_revision(&self, selector: &RevisionSelector) -> BranchResult<Vec<u8>>;

    /// Content of `revision` for a side-by-side comparison.
    fn get_for_visual_compare(&self, revision: &str) -> BranchResult<Vec<u8>> {
        self.get_revision(&RevisionSelector::Revision(revision.to_string()))
    }

    fn short_workfile_name(&self) -> BranchResult<String> {
        Ok(self.logfile_info()?.short_workfile_name)
    }

    fn lock_count(&self) -> BranchResult<usize> {
        Ok(self.logfile_info()?.lock_count)
    }

    fn locked_by(&self) -> BranchResult<String> {
        Ok(self.logfile_info()?.locked_by)
    }

    fn last_check_in(&self) -> BranchResult<Timestamp> {
        Ok(self.logfile_info()?.last_check_in)
    }

    fn last_edit_by(&self) -> BranchResult<String> {
        Ok(self.logfile_info()?.last_edit_by)
    }

    fn default_revision_digest(&self) -> BranchResult<ContentDigest> {
        Ok(self.logfile_info()?.default_digest)
    }

    fn default_revision_string(&self) -> BranchResult<String> {
        Ok(self.logfile_info()?.default_revision.to_string())
    }

    fn attributes(&self) -> BranchResult<ArchiveAttributes> {
        Ok(self.archive().read(|a| a.attributes())?)
    }

    fn revision_count(&self) -> BranchResult<usize> {
        Ok(self.logfile_info()?.revisions.len())
    }

    /// Storage key of the archive behind this view.
    fn full_archive_filename(&self) -> BranchResult<String> {
        Ok(self.archive().key()?)
    }

    fn file_id(&self) -> BranchResult<FileId> {
        Ok(self.archive().read(|a| a.file_id())?)
    }

    /// Lock `revision` (the visible tip when `None`) and return its content.
    fn check_out(&self, user: &str, revision: Option<&str>, comment: &str, at: Timestamp) -> BranchResult<CheckOut>;

    fn check_in(
        &self,
        user: &str,
        locked_revision: &str,
        content: &[u8],
        comment: &str,
        options: &CheckInOptions,
    ) -> BranchResult<CheckInOutcome>;

    /// Lock `revision`, the visible tip when `None`.
    fn lock_revision(&self, user: &str, revision: Option<&str>, at: Timestamp) -> BranchResult<RevisionNumber>;

    fn unlock_revision(&self, user: &str, revision: &str) -> BranchResult<()>;

    /// Remove somebody else's lock. Returns the former holder.
    fn break_lock(&self, admin: &str, revision: &str) -> BranchResult<String>;

    /// Apply a label; an untargeted label lands on the visible tip.
    fn label_revision(&self, user: &str, args: &LabelArgs) -> BranchResult<bool>;

    fn unlabel_revision(&self, user: &str, label: &str) -> BranchResult<bool>;

    fn set_attributes(&self, user: &str, attributes: ArchiveAttributes) -> BranchResult<bool>;

    fn set_comment_prefix(&self, user: &str, prefix: &str) -> BranchResult<bool>;

    fn set_module_description(&self, user: &str, description: &str) -> BranchResult<bool>;

    fn set_revision_description(&self, user: &str, revision: &str, description: &str) -> BranchResult<bool>;

    fn set_is_obsolete(&self, user: &str, obsolete: bool) -> BranchResult<bool>;

    /// Absorb the parent's current state. Returns the parent revision the
    /// branch is now anchored at.
    fn resolve_conflict_from_parent_branch(&self, user: &str, at: Timestamp) -> BranchResult<RevisionNumber>;
}

/// Open `file` as seen from the branch named `branch_name`.
pub fn open_view(registry: &BranchRegistry, branch_name: &str, file: Arc<ArchiveFile>) -> BranchResult<Box<dyn BranchView>> {
    let branch = registry.get(branch_name)?;
    let chain = registry.ancestry(branch.id)?;
    if branch.is_writable() {
        Ok(Box::new(WritableBranchView::new(chain, file)?))
    } else {
        Ok(Box::new(DateBasedView::new(chain, file)?))
    }
}
