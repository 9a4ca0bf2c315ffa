use std::sync::Arc;

use tracing::{debug, warn};

use arbor_archive::{
    ArchiveAttributes, ArchiveError, ArchiveFile, CheckInOptions, CheckInOutcome, CheckOut, LabelArgs, LogfileInfo,
    RevisionArchive, RevisionSelector,
};
use arbor_types::{RevisionNumber, Timestamp};

use crate::error::{BranchError, BranchResult};
use crate::names::{anchor_label, ensure_user_label, tracking_label};
use crate::registry::{Branch, BranchKind};
use crate::tip::{anchor_tip, visible_tip};
use crate::view::BranchView;

/// View of an archive from the trunk or a writable branch.
///
/// On the trunk every operation goes straight to the archive. On any other
/// writable branch the first check-in forks a new revision line off the
/// visible tip and a floating tracking label follows that line from then on.
pub struct WritableBranchView {
    chain: Vec<Branch>,
    file: Arc<ArchiveFile>,
}

impl WritableBranchView {
    /// `chain` is the branch followed by its ancestors, ending at the trunk.
    pub fn new(chain: Vec<Branch>, file: Arc<ArchiveFile>) -> BranchResult<Self> {
        let Some(branch) = chain.first() else {
            return Err(BranchError::BranchNotFound {
                name: "<empty ancestry>".into(),
            });
        };
        if !branch.is_writable() {
            return Err(BranchError::NotSupported {
                operation: "writable view".into(),
                branch: branch.name.clone(),
            });
        }
        Ok(Self { chain, file })
    }

    fn tip(&self, archive: &RevisionArchive) -> BranchResult<usize> {
        visible_tip(archive, &self.chain).ok_or_else(|| BranchError::NothingVisible {
            branch: self.chain[0].name.clone(),
        })
    }

    fn target(&self, archive: &RevisionArchive, revision: Option<&str>) -> BranchResult<String> {
        match revision {
            Some(rev) => Ok(rev.to_string()),
            None => Ok(archive.node(self.tip(archive)?).number.to_string()),
        }
    }

    fn index_at(&self, archive: &RevisionArchive, selector: &RevisionSelector) -> BranchResult<usize> {
        Ok(match selector {
            RevisionSelector::Default => self.tip(archive)?,
            RevisionSelector::AsOf(as_of) => archive
                .newest_ancestor_as_of(self.tip(archive)?, *as_of)
                .ok_or_else(|| ArchiveError::RevisionNotFound {
                    revision: format!("as of {as_of}"),
                })?,
            other => archive.resolve(other)?,
        })
    }

    fn info_of(&self, archive: &RevisionArchive) -> BranchResult<LogfileInfo> {
        let mut info = archive.info();
        if !self.branch().is_trunk() {
            let tip = archive.node(self.tip(archive)?);
            info.default_revision = tip.number.clone();
            info.default_digest = tip.digest;
            info.last_check_in = tip.check_in_time;
            info.last_edit_by = tip.author.clone();
        }
        Ok(info)
    }
}

impl BranchView for WritableBranchView {
    fn branch(&self) -> &Branch {
        &self.chain[0]
    }

    fn archive(&self) -> &Arc<ArchiveFile> {
        &self.file
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn logfile_info(&self) -> BranchResult<LogfileInfo> {
        self.file.read(|a| self.info_of(a))?
    }

    fn revision_index(&self, selector: &RevisionSelector) -> BranchResult<usize> {
        self.file.read(|a| self.index_at(a, selector))?
    }

    fn get_revision(&self, selector: &RevisionSelector) -> BranchResult<Vec<u8>> {
        self.file.read(|a| -> BranchResult<Vec<u8>> {
            let idx = self.index_at(a, selector)?;
            Ok(a.content(idx)?)
        })?
    }

    fn check_out(&self, user: &str, revision: Option<&str>, comment: &str, at: Timestamp) -> BranchResult<CheckOut> {
        self.file.update(|a| {
            let target = self.target(a, revision)?;
            Ok(a.check_out(user, &target, comment, at)?)
        })
    }

    fn check_in(
        &self,
        user: &str,
        locked_revision: &str,
        content: &[u8],
        comment: &str,
        options: &CheckInOptions,
    ) -> BranchResult<CheckInOutcome> {
        if let Some(label) = &options.label {
            ensure_user_label(label)?;
        }
        let branch = self.branch();
        if branch.is_trunk() {
            return self
                .file
                .update(|a| Ok(a.check_in(user, locked_revision, content, comment, options)?));
        }

        self.file.update(|a| {
            let tip = self.tip(a)?;
            if a.find_revision(locked_revision)? != tip {
                return Err(BranchError::NotBranchTip {
                    branch: branch.name.clone(),
                    revision: locked_revision.to_string(),
                    tip: a.node(tip).number.to_string(),
                });
            }
            let tracking = tracking_label(&branch.name);
            let branch_options = CheckInOptions {
                force_branch: options.force_branch || a.find_label(&tracking).is_none(),
                ..options.clone()
            };
            let outcome = a.check_in(user, locked_revision, content, comment, &branch_options)?;
            if outcome.created {
                let args = LabelArgs::new(tracking).at(outcome.revision.to_string()).floating().reuse();
                a.label_revision(user, &args)?;
                debug!(branch = %branch.name, revision = %outcome.revision, "branch tip advanced");
            }
            Ok(outcome)
        })
    }

    fn lock_revision(&self, user: &str, revision: Option<&str>, at: Timestamp) -> BranchResult<RevisionNumber> {
        self.file.update(|a| {
            let target = self.target(a, revision)?;
            Ok(a.lock_revision(user, &target, at)?)
        })
    }

    fn unlock_revision(&self, user: &str, revision: &str) -> BranchResult<()> {
        Ok(self.file.update(|a| a.unlock_revision(user, revision))?)
    }

    fn break_lock(&self, admin: &str, revision: &str) -> BranchResult<String> {
        Ok(self.file.update(|a| a.break_lock(admin, revision))?)
    }

    fn label_revision(&self, user: &str, args: &LabelArgs) -> BranchResult<bool> {
        ensure_user_label(&args.label)?;
        self.file.update(|a| {
            let mut args = args.clone();
            if args.revision.is_none() && args.duplicate_of.is_none() {
                args.revision = Some(self.target(a, None)?);
            }
            Ok(a.label_revision(user, &args)?)
        })
    }

    fn unlabel_revision(&self, user: &str, label: &str) -> BranchResult<bool> {
        ensure_user_label(label)?;
        Ok(self.file.update(|a| a.unlabel_revision(user, label))?)
    }

    fn set_attributes(&self, user: &str, attributes: ArchiveAttributes) -> BranchResult<bool> {
        Ok(self
            .file
            .update(|a| Ok::<_, ArchiveError>(a.set_attributes(user, attributes)))?)
    }

    fn set_comment_prefix(&self, user: &str, prefix: &str) -> BranchResult<bool> {
        Ok(self
            .file
            .update(|a| Ok::<_, ArchiveError>(a.set_comment_prefix(user, prefix)))?)
    }

    fn set_module_description(&self, user: &str, description: &str) -> BranchResult<bool> {
        Ok(self
            .file
            .update(|a| Ok::<_, ArchiveError>(a.set_module_description(user, description)))?)
    }

    fn set_revision_description(&self, user: &str, revision: &str, description: &str) -> BranchResult<bool> {
        Ok(self
            .file
            .update(|a| a.set_revision_description(user, revision, description))?)
    }

    fn set_is_obsolete(&self, user: &str, obsolete: bool) -> BranchResult<bool> {
        Ok(self
            .file
            .update(|a| Ok::<_, ArchiveError>(a.set_is_obsolete(user, obsolete)))?)
    }

    fn resolve_conflict_from_parent_branch(&self, user: &str, at: Timestamp) -> BranchResult<RevisionNumber> {
        let branch = self.branch();
        if branch.is_trunk() {
            return Err(BranchError::NotSupported {
                operation: "resolve conflict from parent branch".into(),
                branch: branch.name.clone(),
            });
        }
        let parents = &self.chain[1..];

        self.file.update(|a| {
            let parent_tip = visible_tip(a, parents).ok_or_else(|| BranchError::NothingVisible {
                branch: branch.name.clone(),
            })?;
            let parent_number = a.node(parent_tip).number.clone();
            let tracking = tracking_label(&branch.name);
            let has_local = a.find_label(&tracking).is_some();

            if !has_local {
                let base = anchor_tip(a, branch).or_else(|| match branch.kind {
                    BranchKind::Opaque => visible_tip(a, &self.chain),
                    _ => Some(parent_tip),
                });
                if base == Some(parent_tip) {
                    warn!(branch = %branch.name, user, revision = %parent_number, "branch already resolved");
                    return Err(BranchError::AlreadyResolved {
                        branch: branch.name.clone(),
                        revision: parent_number.to_string(),
                    });
                }
            } else {
                a.unlabel_revision(user, &tracking)?;
            }

            let anchor = LabelArgs::new(anchor_label(&branch.name))
                .at(parent_number.to_string())
                .reuse();
            a.label_revision(user, &anchor)?;
            debug!(branch = %branch.name, user, anchored = %parent_number, %at, "branch resolved against parent");
            Ok(parent_number)
        })
    }
}

impl std::fmt::Debug for WritableBranchView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableBranchView")
            .field("branch", &self.chain[0].name)
            .field("archive", &self.file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BranchRegistry, TRUNK_NAME};
    use crate::view::open_view;
    use arbor_archive::{ArchiveRepository, CreateArchive, InMemoryArchiveStore};
    use arbor_types::FileId;

    struct Fixture {
        registry: BranchRegistry,
        file: Arc<ArchiveFile>,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = ArchiveRepository::new(Arc::new(InMemoryArchiveStore::new()));
            let mut params = CreateArchive::new(FileId::new(1), "main.c", "alice");
            params.timestamp = Timestamp::from_millis(1_000);
            let file = repo.create_archive("main.c", params, b"v1\n").unwrap();
            Self {
                registry: BranchRegistry::new(),
                file,
            }
        }

        fn view(&self, branch: &str) -> Box<dyn BranchView> {
            open_view(&self.registry, branch, Arc::clone(&self.file)).unwrap()
        }

        fn branch(&self, name: &str, kind: BranchKind, at: i64) {
            self.registry
                .create_branch(name, kind, TRUNK_NAME, Timestamp::from_millis(at))
                .unwrap();
        }
    }

    fn opts(at: i64) -> CheckInOptions {
        CheckInOptions {
            check_in_time: Some(Timestamp::from_millis(at)),
            ..CheckInOptions::default()
        }
    }

    fn commit(view: &dyn BranchView, body: &str, at: i64) -> CheckInOutcome {
        let locked = view.lock_revision("alice", None, Timestamp::from_millis(at)).unwrap();
        view.check_in("alice", &locked.to_string(), body.as_bytes(), "edit", &opts(at))
            .unwrap()
    }

    // ----------------------------------------------------------------
    // Trunk
    // ----------------------------------------------------------------

    #[test]
    fn trunk_view_delegates() {
        let fx = Fixture::new();
        let trunk = fx.view(TRUNK_NAME);
        assert_eq!(commit(trunk.as_ref(), "v2\n", 2_000).revision.to_string(), "1.2");
        assert_eq!(trunk.default_revision_string().unwrap(), "1.2");
        assert_eq!(trunk.get_revision(&RevisionSelector::Default).unwrap(), b"v2\n");
        assert_eq!(trunk.full_archive_filename().unwrap(), "main.c,v");
        assert_eq!(trunk.file_id().unwrap(), FileId::new(1));
        assert!(matches!(
            trunk.resolve_conflict_from_parent_branch("alice", Timestamp::now()),
            Err(BranchError::NotSupported { .. })
        ));
    }

    // ----------------------------------------------------------------
    // Branch check-ins
    // ----------------------------------------------------------------

    #[test]
    fn branch_forks_then_extends() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let dev = fx.view("dev");

        assert_eq!(dev.default_revision_string().unwrap(), "1.1");
        assert_eq!(commit(dev.as_ref(), "dev1\n", 2_000).revision.to_string(), "1.1.1.1");
        assert_eq!(commit(dev.as_ref(), "dev2\n", 3_000).revision.to_string(), "1.1.1.2");
        assert_eq!(dev.get_revision(&RevisionSelector::Default).unwrap(), b"dev2\n");
        let idx = dev.revision_index(&RevisionSelector::Default).unwrap();
        assert_eq!(fx.file.read(|a| a.node(idx).number.to_string()).unwrap(), "1.1.1.2");

        let trunk = fx.view(TRUNK_NAME);
        assert_eq!(trunk.default_revision_string().unwrap(), "1.1");
        assert_eq!(trunk.get_revision(&RevisionSelector::Default).unwrap(), b"v1\n");
    }

    #[test]
    fn forced_branch_check_in_on_branch_forks_again() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let dev = fx.view("dev");
        assert_eq!(commit(dev.as_ref(), "d1\n", 2_000).revision.to_string(), "1.1.1.1");

        let locked = dev.lock_revision("alice", Some("1.1.1.1"), Timestamp::from_millis(3_000)).unwrap();
        let forced = CheckInOptions {
            force_branch: true,
            ..opts(3_000)
        };
        let outcome = dev
            .check_in("alice", &locked.to_string(), b"d2\n", "edit", &forced)
            .unwrap();
        assert_eq!(outcome.revision.to_string(), "1.1.1.1.1.1");
        assert_eq!(dev.default_revision_string().unwrap(), "1.1.1.1.1.1");
        assert_eq!(dev.get_revision(&RevisionSelector::Default).unwrap(), b"d2\n");

        // The branch keeps extending the new line afterwards.
        assert_eq!(commit(dev.as_ref(), "d3\n", 4_000).revision.to_string(), "1.1.1.1.1.2");
        assert_eq!(fx.view(TRUNK_NAME).default_revision_string().unwrap(), "1.1");
    }

    #[test]
    fn translucent_branch_sees_trunk_until_local_change() {
        let fx = Fixture::new();
        fx.branch("t", BranchKind::Translucent, 1_500);
        let trunk = fx.view(TRUNK_NAME);
        let t = fx.view("t");

        commit(trunk.as_ref(), "v2\n", 2_000);
        assert_eq!(t.default_revision_string().unwrap(), "1.2");
        commit(t.as_ref(), "t1\n", 3_000);
        commit(trunk.as_ref(), "v3\n", 4_000);
        assert_eq!(t.default_revision_string().unwrap(), "1.2.1.1");
        assert_eq!(t.last_edit_by().unwrap(), "alice");
        assert_eq!(t.last_check_in().unwrap(), Timestamp::from_millis(3_000));
    }

    #[test]
    fn opaque_branch_is_frozen_at_creation() {
        let fx = Fixture::new();
        fx.branch("o", BranchKind::Opaque, 1_500);
        let trunk = fx.view(TRUNK_NAME);
        commit(trunk.as_ref(), "v2\n", 2_000);
        let o = fx.view("o");
        assert_eq!(o.default_revision_string().unwrap(), "1.1");
        assert_eq!(o.get_revision(&RevisionSelector::Default).unwrap(), b"v1\n");
    }

    #[test]
    fn branch_check_in_must_target_tip() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let trunk = fx.view(TRUNK_NAME);
        commit(trunk.as_ref(), "v2\n", 2_000);
        let dev = fx.view("dev");
        dev.lock_revision("alice", Some("1.1"), Timestamp::now()).unwrap();
        let err = dev
            .check_in("alice", "1.1", b"x\n", "", &CheckInOptions::default())
            .unwrap_err();
        assert!(matches!(err, BranchError::NotBranchTip { .. }));
    }

    #[test]
    fn reserved_labels_rejected() {
        let fx = Fixture::new();
        let trunk = fx.view(TRUNK_NAME);
        assert!(matches!(
            trunk.label_revision("alice", &LabelArgs::new("branch:dev")),
            Err(BranchError::ReservedLabel { .. })
        ));
        assert!(matches!(
            trunk.unlabel_revision("alice", "anchor:dev"),
            Err(BranchError::ReservedLabel { .. })
        ));
    }

    #[test]
    fn untargeted_label_lands_on_branch_tip() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let dev = fx.view("dev");
        commit(dev.as_ref(), "dev1\n", 2_000);
        assert!(dev.label_revision("alice", &LabelArgs::new("DEV_1")).unwrap());
        let info = dev.logfile_info().unwrap();
        let label = info.labels.iter().find(|l| l.name == "DEV_1").unwrap();
        assert_eq!(label.revision.as_ref().unwrap().to_string(), "1.1.1.1");
    }

    #[test]
    fn metadata_mutators_report_change() {
        let fx = Fixture::new();
        let trunk = fx.view(TRUNK_NAME);
        assert!(trunk.set_comment_prefix("alice", "# ").unwrap());
        assert!(!trunk.set_comment_prefix("alice", "# ").unwrap());
        assert!(trunk.set_module_description("alice", "entry point").unwrap());
        assert!(trunk.set_revision_description("alice", "1.1", "first").unwrap());
        assert!(trunk.set_is_obsolete("alice", true).unwrap());
        let mut attrs = trunk.attributes().unwrap();
        attrs.expand_keywords = true;
        assert!(trunk.set_attributes("alice", attrs).unwrap());
        assert!(trunk.attributes().unwrap().expand_keywords);
    }

    // ----------------------------------------------------------------
    // Resolve against parent
    // ----------------------------------------------------------------

    #[test]
    fn resolve_is_idempotent_once() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let dev = fx.view("dev");
        let trunk = fx.view(TRUNK_NAME);

        commit(dev.as_ref(), "dev1\n", 2_000);
        commit(trunk.as_ref(), "v2\n", 3_000);

        let anchored = dev.resolve_conflict_from_parent_branch("alice", Timestamp::now()).unwrap();
        assert_eq!(anchored.to_string(), "1.2");
        assert_eq!(dev.default_revision_string().unwrap(), "1.2");
        // Branch revisions are untouched.
        assert_eq!(
            dev.get_revision(&RevisionSelector::Revision("1.1.1.1".into())).unwrap(),
            b"dev1\n"
        );

        let again = dev.resolve_conflict_from_parent_branch("alice", Timestamp::now());
        assert!(matches!(again, Err(BranchError::AlreadyResolved { .. })));

        commit(trunk.as_ref(), "v3\n", 4_000);
        let anchored = dev.resolve_conflict_from_parent_branch("alice", Timestamp::now()).unwrap();
        assert_eq!(anchored.to_string(), "1.3");
    }

    #[test]
    fn resolve_on_untouched_translucent_branch_is_already_resolved() {
        let fx = Fixture::new();
        fx.branch("t", BranchKind::Translucent, 1_500);
        let t = fx.view("t");
        assert!(matches!(
            t.resolve_conflict_from_parent_branch("alice", Timestamp::now()),
            Err(BranchError::AlreadyResolved { .. })
        ));
    }

    #[test]
    fn resolve_moves_opaque_base_forward() {
        let fx = Fixture::new();
        fx.branch("o", BranchKind::Opaque, 1_500);
        let trunk = fx.view(TRUNK_NAME);
        commit(trunk.as_ref(), "v2\n", 2_000);
        let o = fx.view("o");
        assert_eq!(o.default_revision_string().unwrap(), "1.1");
        o.resolve_conflict_from_parent_branch("alice", Timestamp::now()).unwrap();
        assert_eq!(o.default_revision_string().unwrap(), "1.2");
        commit(trunk.as_ref(), "v3\n", 3_000);
        assert_eq!(o.default_revision_string().unwrap(), "1.2");
    }

    #[test]
    fn failed_branch_check_in_keeps_lock() {
        let fx = Fixture::new();
        fx.branch("dev", BranchKind::Feature, 1_500);
        let dev = fx.view("dev");
        dev.lock_revision("alice", None, Timestamp::now()).unwrap();
        let stale = CheckInOptions {
            input_timestamp: Some(Timestamp::from_millis(10)),
            ..CheckInOptions::default()
        };
        let err = dev.check_in("alice", "1.1", b"x\n", "", &stale).unwrap_err();
        assert!(matches!(err, BranchError::Archive(ArchiveError::StaleTimestamp { .. })));
        assert_eq!(dev.locked_by().unwrap(), "alice");
    }
}
