use std::sync::Arc;

use tracing::debug;

use arbor_archive::{
    ArchiveAttributes, ArchiveError, ArchiveFile, CheckInOptions, CheckInOutcome, CheckOut, LabelArgs, LabelInfo,
    LogfileInfo, RevisionArchive, RevisionSelector,
};
use arbor_types::{RevisionNumber, Timestamp};

use crate::error::{BranchError, BranchResult};
use crate::registry::Branch;
use crate::tip::visible_tip;
use crate::view::BranchView;

/// Read-only view of an archive frozen at the branch's date.
///
/// Nothing checked in after the date is reachable through this view, not
/// even by explicit revision number or label.
pub struct DateBasedView {
    chain: Vec<Branch>,
    as_of: Timestamp,
    file: Arc<ArchiveFile>,
}

impl DateBasedView {
    pub fn new(chain: Vec<Branch>, file: Arc<ArchiveFile>) -> BranchResult<Self> {
        let Some(branch) = chain.first() else {
            return Err(BranchError::BranchNotFound {
                name: "<empty ancestry>".into(),
            });
        };
        let Some(as_of) = branch.kind.as_of() else {
            return Err(BranchError::NotSupported {
                operation: "date-based view".into(),
                branch: branch.name.clone(),
            });
        };
        Ok(Self { chain, as_of, file })
    }

    pub fn as_of(&self) -> Timestamp {
        self.as_of
    }

    fn read_only(&self, operation: &str) -> BranchError {
        debug!(branch = %self.chain[0].name, operation, "rejected on read-only branch");
        BranchError::ReadOnly {
            branch: self.chain[0].name.clone(),
        }
    }

    fn rejected(&self, operation: &str) -> BranchResult<bool> {
        debug!(branch = %self.chain[0].name, operation, "no-op on read-only branch");
        Ok(false)
    }

    fn tip(&self, archive: &RevisionArchive) -> BranchResult<usize> {
        visible_tip(archive, &self.chain).ok_or_else(|| BranchError::NothingVisible {
            branch: self.chain[0].name.clone(),
        })
    }

    fn is_visible(&self, archive: &RevisionArchive, idx: usize) -> bool {
        archive.node(idx).check_in_time <= self.as_of
    }

    /// Resolve a label as it stood at the branch date.
    fn resolve_label(&self, archive: &RevisionArchive, name: &str) -> Option<usize> {
        let label = archive.find_label(name)?;
        let idx = archive.resolve_label(name).ok()?;
        if label.floating {
            archive.newest_ancestor_as_of(idx, self.as_of)
        } else {
            self.is_visible(archive, idx).then_some(idx)
        }
    }

    fn index_of(&self, archive: &RevisionArchive, selector: &RevisionSelector) -> BranchResult<usize> {
        let not_found = |what: String| BranchError::Archive(ArchiveError::RevisionNotFound { revision: what });
        match selector {
            RevisionSelector::Default => self.tip(archive),
            RevisionSelector::AsOf(at) => archive
                .newest_ancestor_as_of(self.tip(archive)?, (*at).min(self.as_of))
                .ok_or_else(|| not_found(format!("as of {at}"))),
            RevisionSelector::Revision(rev) => {
                let idx = archive.find_revision(rev)?;
                if self.is_visible(archive, idx) {
                    Ok(idx)
                } else {
                    Err(not_found(rev.clone()))
                }
            }
            RevisionSelector::Label(name) => {
                self.resolve_label(archive, name)
                    .ok_or_else(|| BranchError::Archive(ArchiveError::LabelNotFound { label: name.clone() }))
            }
        }
    }

    fn info_of(&self, archive: &RevisionArchive) -> BranchResult<LogfileInfo> {
        let tip = archive.node(self.tip(archive)?);
        let mut info = archive.info();
        info.revisions.retain(|r| r.check_in_time <= self.as_of);
        for revision in &mut info.revisions {
            revision.locked_by = None;
        }
        info.labels = archive
            .header()
            .labels
            .iter()
            .map(|l| LabelInfo {
                name: l.name.clone(),
                revision: self
                    .resolve_label(archive, &l.name)
                    .map(|idx| archive.node(idx).number.clone()),
                floating: l.floating,
            })
            .filter(|l| l.revision.is_some())
            .collect();
        info.default_revision = tip.number.clone();
        info.default_digest = tip.digest;
        info.last_check_in = tip.check_in_time;
        info.last_edit_by = tip.author.clone();
        info.lock_count = 0;
        info.locked_by = String::new();
        Ok(info)
    }
}

impl BranchView for DateBasedView {
    fn branch(&self) -> &Branch {
        &self.chain[0]
    }

    fn archive(&self) -> &Arc<ArchiveFile> {
        &self.file
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn logfile_info(&self) -> BranchResult<LogfileInfo> {
        self.file.read(|a| self.info_of(a))?
    }

    fn revision_index(&self, selector: &RevisionSelector) -> BranchResult<usize> {
        self.file.read(|a| self.index_of(a, selector))?
    }

    fn get_revision(&self, selector: &RevisionSelector) -> BranchResult<Vec<u8>> {
        self.file.read(|a| -> BranchResult<Vec<u8>> {
            let idx = self.index_of(a, selector)?;
            Ok(a.content(idx)?)
        })?
    }

    fn check_out(&self, _user: &str, _revision: Option<&str>, _comment: &str, _at: Timestamp) -> BranchResult<CheckOut> {
        Err(self.read_only("check out"))
    }

    fn check_in(
        &self,
        _user: &str,
        _locked_revision: &str,
        _content: &[u8],
        _comment: &str,
        _options: &CheckInOptions,
    ) -> BranchResult<CheckInOutcome> {
        Err(self.read_only("check in"))
    }

    fn lock_revision(&self, _user: &str, _revision: Option<&str>, _at: Timestamp) -> BranchResult<RevisionNumber> {
        Err(self.read_only("lock"))
    }

    fn unlock_revision(&self, _user: &str, _revision: &str) -> BranchResult<()> {
        Err(self.read_only("unlock"))
    }

    fn break_lock(&self, _admin: &str, _revision: &str) -> BranchResult<String> {
        Err(self.read_only("break lock"))
    }

    fn label_revision(&self, _user: &str, _args: &LabelArgs) -> BranchResult<bool> {
        self.rejected("label")
    }

    fn unlabel_revision(&self, _user: &str, _label: &str) -> BranchResult<bool> {
        self.rejected("unlabel")
    }

    fn set_attributes(&self, _user: &str, _attributes: ArchiveAttributes) -> BranchResult<bool> {
        self.rejected("set attributes")
    }

    fn set_comment_prefix(&self, _user: &str, _prefix: &str) -> BranchResult<bool> {
        self.rejected("set comment prefix")
    }

    fn set_module_description(&self, _user: &str, _description: &str) -> BranchResult<bool> {
        self.rejected("set module description")
    }

    fn set_revision_description(&self, _user: &str, _revision: &str, _description: &str) -> BranchResult<bool> {
        self.rejected("set revision description")
    }

    fn set_is_obsolete(&self, _user: &str, _obsolete: bool) -> BranchResult<bool> {
        self.rejected("set obsolete")
    }

    fn resolve_conflict_from_parent_branch(&self, _user: &str, _at: Timestamp) -> BranchResult<RevisionNumber> {
        Err(self.read_only("resolve conflict"))
    }
}

impl std::fmt::Debug for DateBasedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateBasedView")
            .field("branch", &self.chain[0].name)
            .field("as_of", &self.as_of)
            .field("archive", &self.file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BranchKind, BranchRegistry, TRUNK_NAME};
    use crate::view::open_view;
    use arbor_archive::{ArchiveRepository, CreateArchive, InMemoryArchiveStore};
    use arbor_types::FileId;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    /// Trunk with 1.1 @1000, 1.2 @2000, 1.3 @3000 and label REL on 1.2.
    fn setup() -> (BranchRegistry, Arc<ArchiveFile>) {
        let repo = ArchiveRepository::new(Arc::new(InMemoryArchiveStore::new()));
        let mut params = CreateArchive::new(FileId::new(5), "notes.txt", "alice");
        params.timestamp = at(1_000);
        let file = repo.create_archive("notes.txt", params, b"one\n").unwrap();
        for (rev, body, time) in [("1.1", "two\n", 2_000), ("1.2", "three\n", 3_000)] {
            file.update(|a| {
                a.lock_revision("bob", rev, at(time))?;
                let opts = CheckInOptions {
                    check_in_time: Some(at(time)),
                    ..CheckInOptions::default()
                };
                a.check_in("bob", rev, body.as_bytes(), "edit", &opts)
            })
            .unwrap();
        }
        file.update(|a| a.label_revision("bob", &LabelArgs::new("REL").at("1.2")))
            .unwrap();
        file.update(|a| a.lock_revision("bob", "1.3", at(3_500))).unwrap();

        let registry = BranchRegistry::new();
        registry
            .create_branch("snap", BranchKind::DateBased { as_of: at(2_500) }, TRUNK_NAME, at(4_000))
            .unwrap();
        (registry, file)
    }

    #[test]
    fn tip_is_newest_as_of_date() {
        let (registry, file) = setup();
        let view = open_view(&registry, "snap", file).unwrap();
        assert!(view.is_read_only());
        assert_eq!(view.default_revision_string().unwrap(), "1.2");
        assert_eq!(view.get_revision(&RevisionSelector::Default).unwrap(), b"two\n");
        assert_eq!(view.last_check_in().unwrap(), at(2_000));
        assert_eq!(view.revision_count().unwrap(), 2);
    }

    #[test]
    fn info_never_exposes_newer_revisions() {
        let (registry, file) = setup();
        let view = open_view(&registry, "snap", file).unwrap();
        let info = view.logfile_info().unwrap();
        assert!(info.revisions.iter().all(|r| r.check_in_time <= at(2_500)));
        assert_eq!(info.lock_count, 0);
        assert_eq!(info.labels.len(), 1);
        assert!(matches!(
            view.get_revision(&RevisionSelector::Revision("1.3".into())),
            Err(BranchError::Archive(ArchiveError::RevisionNotFound { .. }))
        ));
        assert_eq!(
            view.get_revision(&RevisionSelector::Label("REL".into())).unwrap(),
            b"two\n"
        );
    }

    #[test]
    fn mutators_fail_without_side_effects() {
        let (registry, file) = setup();
        let before = file.info().unwrap();
        let view = open_view(&registry, "snap", Arc::clone(&file)).unwrap();

        assert!(!view.label_revision("bob", &LabelArgs::new("X")).unwrap());
        assert!(!view.unlabel_revision("bob", "REL").unwrap());
        assert!(!view.set_comment_prefix("bob", "//").unwrap());
        assert!(!view.set_is_obsolete("bob", true).unwrap());
        assert!(!view.set_attributes("bob", ArchiveAttributes::binary()).unwrap());
        assert!(matches!(view.lock_revision("bob", None, at(5_000)), Err(BranchError::ReadOnly { .. })));
        assert!(matches!(view.break_lock("admin", "1.3"), Err(BranchError::ReadOnly { .. })));
        assert!(matches!(
            view.check_in("bob", "1.3", b"x", "", &CheckInOptions::default()),
            Err(BranchError::ReadOnly { .. })
        ));
        assert!(matches!(
            view.resolve_conflict_from_parent_branch("bob", at(5_000)),
            Err(BranchError::ReadOnly { .. })
        ));

        assert_eq!(file.info().unwrap(), before);
    }

    #[test]
    fn date_before_first_revision_sees_nothing() {
        let (registry, file) = setup();
        registry
            .create_branch("ancient", BranchKind::DateBased { as_of: at(10) }, TRUNK_NAME, at(4_000))
            .unwrap();
        let view = open_view(&registry, "ancient", file).unwrap();
        assert!(matches!(view.logfile_info(), Err(BranchError::NothingVisible { .. })));
    }
}
