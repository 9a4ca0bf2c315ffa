//! Which revision of an archive a branch sees.

use arbor_archive::RevisionArchive;

use crate::names::{anchor_label, tracking_label};
use crate::registry::{Branch, BranchKind};

/// Index of the revision visible through `chain` (a branch followed by its
/// ancestors, ending with the trunk).
///
/// - trunk: the trunk tip
/// - writable branch with local revisions: the tip of its tracking label
/// - feature/translucent branch otherwise: whatever its parent sees
/// - opaque branch otherwise: its resolve anchor, or its parent as of the
///   branch's creation
/// - date-based branch: the newest ancestor of the parent's tip checked in
///   at or before the branch date
///
/// `None` only when a date-based branch predates every revision.
pub fn visible_tip(archive: &RevisionArchive, chain: &[Branch]) -> Option<usize> {
    let (branch, parents) = chain.split_first()?;
    match branch.kind {
        BranchKind::Trunk => Some(archive.trunk_tip()),
        BranchKind::DateBased { as_of } => {
            let parent_tip = visible_tip(archive, parents)?;
            archive.newest_ancestor_as_of(parent_tip, as_of)
        }
        BranchKind::Feature | BranchKind::Translucent => {
            local_tip(archive, branch).or_else(|| visible_tip(archive, parents))
        }
        BranchKind::Opaque => local_tip(archive, branch)
            .or_else(|| anchor_tip(archive, branch))
            .or_else(|| {
                let parent_tip = visible_tip(archive, parents)?;
                archive
                    .newest_ancestor_as_of(parent_tip, branch.created_at)
                    .or(Some(parent_tip))
            }),
    }
}

/// Tip of the branch's own revision line, if it has checked in locally.
pub fn local_tip(archive: &RevisionArchive, branch: &Branch) -> Option<usize> {
    archive.resolve_label(&tracking_label(&branch.name)).ok()
}

/// Revision the branch was last resolved against.
pub fn anchor_tip(archive: &RevisionArchive, branch: &Branch) -> Option<usize> {
    archive.resolve_label(&anchor_label(&branch.name)).ok()
}
