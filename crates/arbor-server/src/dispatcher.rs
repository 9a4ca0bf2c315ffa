//! Maps client requests onto archive, branch and namespace operations.
//!
//! Every request is checked against the [`PermissionCheck`] first. File
//! paths are resolved through the requesting branch's namespace to a
//! [`FileId`], and the archive is found by that id, so a file keeps its
//! history wherever a branch has moved it. Namespace changes run inside one
//! overlay transaction; on the trunk the archive is relocated inside the
//! same transaction, and a failure on either side leaves both untouched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use arbor_archive::{archive_key, ArchiveAttributes, ArchiveError, ArchiveFile, CreateArchive};
use arbor_branch::{open_view, BranchView, TRUNK_NAME};
use arbor_keywords::{ExpansionContext, KeywordExpander};
use arbor_overlay::{FileIdInfo, FileRecord, InMemoryTables, OverlayError, OverlayTransaction};
use arbor_types::{FileId, RevisionNumber, Timestamp};

use crate::auth::{Action, Identity, PermissionCheck, RoleBased};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::project::Project;
use crate::request::{MetadataChange, Request, Response};

type Tx<'a> = OverlayTransaction<'a, InMemoryTables>;

pub struct Dispatcher {
    project: Project,
    permissions: Box<dyn PermissionCheck>,
}

impl Dispatcher {
    pub fn new(project: Project, permissions: impl PermissionCheck + 'static) -> Self {
        Self {
            project,
            permissions: Box::new(permissions),
        }
    }

    /// Open the configured project with [`RoleBased`] permissions.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        Ok(Self::new(Project::open(config)?, RoleBased))
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn handle(&self, identity: &Identity, request: Request) -> ServerResult<Response> {
        self.handle_at(identity, request, Timestamp::now())
    }

    /// Handle `request` as if it arrived at `at`.
    pub fn handle_at(&self, identity: &Identity, request: Request, at: Timestamp) -> ServerResult<Response> {
        let action = action_for(&request);
        if !self.permissions.allows(identity, &action) {
            warn!(user = %identity.name, %action, "permission denied");
            return Err(ServerError::PermissionDenied {
                user: identity.name.clone(),
                action: action.to_string(),
            });
        }

        let name = request.type_name();
        let mutation = request.is_mutation();
        let result = self.dispatch(&identity.name, request, at);
        match &result {
            Ok(response) => debug!(request = name, user = %identity.name, response = response.type_name(), "request handled"),
            Err(e) if e.is_fatal() => warn!(request = name, user = %identity.name, error = %e, "request failed on stored data"),
            Err(e) => debug!(request = name, user = %identity.name, error = %e, "request rejected"),
        }
        // The change is already live; a failed save leaves the old state on
        // disk until the next successful one.
        if mutation && result.is_ok() {
            if let Err(e) = self.project.save() {
                warn!(request = name, user = %identity.name, error = %e, "project state not saved");
            }
        }
        result
    }

    fn dispatch(&self, user: &str, request: Request, at: Timestamp) -> ServerResult<Response> {
        match request {
            Request::Create {
                branch,
                path,
                content,
                description,
                attributes,
            } => self.create(user, &branch, &path, content, description, attributes, at),
            Request::Get { branch, path, selector } => {
                let (record, file) = self.locate(&branch, &path)?;
                let idx = self.view(&branch, &file)?.revision_index(&selector)?;
                let (revision, content) = self.render(&branch, &record, &file, idx)?;
                Ok(Response::Content { revision, content })
            }
            Request::CheckOut {
                branch,
                path,
                revision,
                comment,
            } => {
                let (record, file) = self.locate(&branch, &path)?;
                let checked_out = self
                    .view(&branch, &file)?
                    .check_out(user, revision.as_deref(), &comment, at)?;
                let idx = file
                    .read(|a| a.index_of(&checked_out.revision))?
                    .ok_or_else(|| ArchiveError::RevisionNotFound {
                        revision: checked_out.revision.to_string(),
                    })?;
                let (revision, content) = self.render(&branch, &record, &file, idx)?;
                Ok(Response::CheckedOut { revision, content })
            }
            Request::CheckIn {
                branch,
                path,
                locked_revision,
                content,
                description,
                mut options,
            } => {
                let (_, file) = self.locate(&branch, &path)?;
                let view = self.view(&branch, &file)?;
                let (content, description) = contract(&view.attributes()?, content, description);
                options.check_in_time.get_or_insert(at);
                let outcome = view.check_in(user, &locked_revision, &content, &description, &options)?;
                Ok(Response::CheckedIn {
                    revision: outcome.revision,
                    created: outcome.created,
                })
            }
            Request::Lock { branch, path, revision } => {
                let view = self.view_of(&branch, &path)?;
                let revision = view.lock_revision(user, revision.as_deref(), at)?;
                Ok(Response::Locked { revision })
            }
            Request::Unlock { branch, path, revision } => {
                self.view_of(&branch, &path)?.unlock_revision(user, &revision)?;
                Ok(Response::Unlocked)
            }
            Request::BreakLock { branch, path, revision } => {
                let holder = self.view_of(&branch, &path)?.break_lock(user, &revision)?;
                info!(user, branch = %branch, path = %path, revision = %revision, holder = %holder, "lock broken");
                Ok(Response::LockBroken { holder })
            }
            Request::Label { branch, path, args } => {
                Ok(Response::Applied(self.view_of(&branch, &path)?.label_revision(user, &args)?))
            }
            Request::Unlabel { branch, path, label } => {
                Ok(Response::Applied(self.view_of(&branch, &path)?.unlabel_revision(user, &label)?))
            }
            Request::SetMetadata { branch, path, change } => {
                let view = self.view_of(&branch, &path)?;
                let changed = match change {
                    MetadataChange::Attributes(attributes) => view.set_attributes(user, attributes)?,
                    MetadataChange::CommentPrefix(prefix) => view.set_comment_prefix(user, &prefix)?,
                    MetadataChange::ModuleDescription(text) => view.set_module_description(user, &text)?,
                    MetadataChange::RevisionDescription { revision, description } => {
                        view.set_revision_description(user, &revision, &description)?
                    }
                    MetadataChange::Obsolete(obsolete) => view.set_is_obsolete(user, obsolete)?,
                };
                Ok(Response::Applied(changed))
            }
            Request::Move {
                branch,
                path,
                destination,
            } => self.move_file(user, &branch, &path, &destination, at),
            Request::Rename { branch, path, new_name } => self.rename(user, &branch, &path, &new_name, at),
            Request::Delete { branch, path } => self.delete(user, &branch, &path, at),
            Request::Undelete { branch, file_id, path } => self.undelete(user, &branch, file_id, &path, at),
            Request::Report { branch, path } => {
                Ok(Response::Report(Box::new(self.view_of(&branch, &path)?.logfile_info()?)))
            }
            Request::Resolve { branch, path } => {
                let anchor = self
                    .view_of(&branch, &path)?
                    .resolve_conflict_from_parent_branch(user, at)?;
                Ok(Response::Resolved { anchor })
            }
            Request::List { branch, directory } => {
                let overlay = self.project.overlay();
                let id = overlay
                    .resolve_directory(&branch, &directory)
                    .map_err(|e| missing(e, &branch, &directory))?;
                Ok(Response::Listing(overlay.directory_contents(&branch, id)?))
            }
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    fn locate(&self, branch: &str, path: &str) -> ServerResult<(FileRecord, Arc<ArchiveFile>)> {
        let record = self
            .project
            .overlay()
            .resolve_file(branch, path)
            .map_err(|e| missing(e, branch, path))?;
        let file = self.archive_of(record.file_id)?;
        Ok((record, file))
    }

    fn archive_of(&self, file_id: FileId) -> ServerResult<Arc<ArchiveFile>> {
        self.project
            .repository()
            .open_by_file_id(file_id)?
            .ok_or(ServerError::ArchiveMissing { file_id })
    }

    fn view(&self, branch: &str, file: &Arc<ArchiveFile>) -> ServerResult<Box<dyn BranchView>> {
        Ok(open_view(self.project.registry(), branch, Arc::clone(file))?)
    }

    fn view_of(&self, branch: &str, path: &str) -> ServerResult<Box<dyn BranchView>> {
        let (_, file) = self.locate(branch, path)?;
        self.view(branch, &file)
    }

    /// Content of revision `idx`, with keywords expanded when the archive
    /// asks for it.
    fn render(
        &self,
        branch: &str,
        record: &FileRecord,
        file: &ArchiveFile,
        idx: usize,
    ) -> ServerResult<(RevisionNumber, Vec<u8>)> {
        let logfile = file.key()?;
        let project = &self.project.config().project;
        let (number, content, attributes, context) = file.read(|a| -> ServerResult<_> {
            let node = a.node(idx);
            let context = ExpansionContext::new(node.number.to_string(), node.author.clone(), node.check_in_time)
                .with_owner(a.header().owner.clone())
                .with_project(project.clone())
                .with_logfile(logfile.clone());
            let context = match a.label_keyword_value(idx) {
                Some(label) => context.with_label(label),
                None => context,
            };
            Ok((node.number.clone(), a.content(idx)?, a.attributes(), context))
        })??;
        if !attributes.expands_keywords() {
            return Ok((number, content));
        }
        let directory = self.project.overlay().directory_path(branch, record.directory_id)?;
        let context = context.with_file(directory, record.name.clone());
        let expanded = KeywordExpander::new(attributes.binary).expand(&content, &context);
        debug!(branch, file = %record.file_id, revision = %number, "keywords expanded");
        Ok((number, expanded))
    }

    // ------------------------------------------------------------------
    // Creation and namespace changes
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        user: &str,
        branch: &str,
        path: &str,
        content: Vec<u8>,
        description: Option<String>,
        attributes: Option<ArchiveAttributes>,
        at: Timestamp,
    ) -> ServerResult<Response> {
        let config = self.project.config();
        let mut attributes = attributes.unwrap_or_else(|| config.attributes_for_new_archive());
        attributes.exclusive_lock |= config.exclusive_locks;
        let (content, description) = contract(&attributes, content, description.unwrap_or_default());
        let (dir_path, name) = split_path(path);
        let archive_path = self.project.archive_path_for(branch, path);
        let overlay = self.project.overlay();

        let (file_id, revision) = overlay.transaction(at, |tx| -> ServerResult<_> {
            let directory = tx.ensure_directory_path(branch, dir_path)?;
            let file_id = overlay.allocate_file_id()?;
            tx.add_file_to_branch(branch, directory, file_id, name)?;

            let mut params = CreateArchive::new(file_id, name, user);
            if !description.is_empty() {
                params.description = description;
            }
            params.attributes = attributes;
            params.timestamp = at;
            let file = self.project.repository().create_archive(&archive_path, params, &content)?;
            let revision = file.read(|a| a.default_revision().clone())?;
            Ok((file_id, revision))
        })?;
        info!(user, branch, path, %file_id, archive = %archive_path, "file created");
        Ok(Response::Created { file_id, revision })
    }

    fn rename(&self, user: &str, branch: &str, path: &str, new_name: &str, at: Timestamp) -> ServerResult<Response> {
        self.project.overlay().transaction(at, |tx| -> ServerResult<Response> {
            let before = staged_file(tx, branch, path)?;
            tx.rename_file_on_branch(branch, before.file_id, &before.name, new_name)?;
            let bookkeeping = if branch == TRUNK_NAME && self.archive_at(before.file_id, &archive_key(&before.path))? {
                self.project.repository().rename_archive(user, &before.path, new_name, at)?
            } else {
                0
            };
            relocated(tx, branch, before.file_id, bookkeeping)
        })
    }

    fn move_file(&self, user: &str, branch: &str, path: &str, destination: &str, at: Timestamp) -> ServerResult<Response> {
        self.project.overlay().transaction(at, |tx| -> ServerResult<Response> {
            let before = staged_file(tx, branch, path)?;
            let target = tx
                .resolve_directory(branch, destination)
                .map_err(|e| missing(e, branch, destination))?;
            tx.move_file_on_branch(branch, before.directory_id, target, before.file_id)?;
            let bookkeeping = if branch == TRUNK_NAME && self.archive_at(before.file_id, &archive_key(&before.path))? {
                let new_dir = tx.directory_path(branch, target)?;
                self.project.repository().move_archive(user, &before.path, &new_dir, at)?
            } else {
                0
            };
            relocated(tx, branch, before.file_id, bookkeeping)
        })
    }

    fn delete(&self, user: &str, branch: &str, path: &str, at: Timestamp) -> ServerResult<Response> {
        self.project.overlay().transaction(at, |tx| -> ServerResult<Response> {
            let before = staged_file(tx, branch, path)?;
            tx.delete_file_from_branch(branch, before.directory_id, before.file_id, &before.name)?;
            let bookkeeping = if branch == TRUNK_NAME && self.archive_at(before.file_id, &archive_key(&before.path))? {
                self.project.repository().delete_archive(user, &before.path, at)?
            } else {
                0
            };
            relocated(tx, branch, before.file_id, bookkeeping)
        })
    }

    fn undelete(&self, user: &str, branch: &str, file_id: FileId, path: &str, at: Timestamp) -> ServerResult<Response> {
        let (dir_path, name) = split_path(path);
        self.project.overlay().transaction(at, |tx| -> ServerResult<Response> {
            let directory = tx.ensure_directory_path(branch, dir_path)?;
            tx.move_file_from_cemetery(branch, directory, file_id, name)?;
            let repository = self.project.repository();
            let bookkeeping = if branch == TRUNK_NAME && self.archive_at(file_id, &repository.cemetery_key(file_id))? {
                let restored = staged_info(tx, branch, file_id, path)?;
                repository.restore_archive(user, file_id, &restored.path, at)?
            } else {
                0
            };
            relocated(tx, branch, file_id, bookkeeping)
        })
    }

    /// Whether the archive of `file_id` is stored under `key`. Archives of
    /// files created on a branch stay where they were created, and only the
    /// namespace follows trunk changes for them.
    fn archive_at(&self, file_id: FileId, key: &str) -> ServerResult<bool> {
        let stored = self.archive_of(file_id)?.key()?;
        if stored != key {
            debug!(%file_id, stored = %stored, expected = %key, "archive not relocated with the namespace");
        }
        Ok(stored == key)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("project", &self.project).finish_non_exhaustive()
    }
}

fn action_for(request: &Request) -> Action {
    let branch = request.branch().to_string();
    let path = request.path().to_string();
    match request {
        Request::Get { .. } | Request::Report { .. } | Request::List { .. } => Action::Read { branch, path },
        Request::Create { .. }
        | Request::CheckOut { .. }
        | Request::CheckIn { .. }
        | Request::Lock { .. }
        | Request::Unlock { .. }
        | Request::Label { .. }
        | Request::Unlabel { .. }
        | Request::Resolve { .. } => Action::Write { branch, path },
        Request::Move { .. } | Request::Rename { .. } | Request::Delete { .. } | Request::Undelete { .. } => {
            Action::Namespace { branch, path }
        }
        Request::BreakLock { .. } | Request::SetMetadata { .. } => Action::Admin { branch, path },
    }
}

/// Strip expanded keywords from incoming content. A `$Comment: ... $`
/// captured on the way stands in for an empty description.
fn contract(attributes: &ArchiveAttributes, content: Vec<u8>, description: String) -> (Vec<u8>, String) {
    if !attributes.expands_keywords() {
        return (content, description);
    }
    let contracted = KeywordExpander::new(attributes.binary).contract(&content);
    let description = match contracted.comment {
        Some(comment) if description.trim().is_empty() => comment,
        _ => description,
    };
    (contracted.content, description)
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

fn missing(err: OverlayError, branch: &str, path: &str) -> ServerError {
    match err {
        OverlayError::PathNotFound { .. } => ServerError::FileNotFound {
            branch: branch.to_string(),
            path: path.to_string(),
        },
        other => other.into(),
    }
}

/// The staged namespace entry of the file at `path`.
fn staged_file(tx: &Tx<'_>, branch: &str, path: &str) -> ServerResult<FileIdInfo> {
    let record = tx.resolve_file(branch, path).map_err(|e| missing(e, branch, path))?;
    staged_info(tx, branch, record.file_id, path)
}

fn staged_info(tx: &Tx<'_>, branch: &str, file_id: FileId, path: &str) -> ServerResult<FileIdInfo> {
    tx.file_id_info(branch, file_id)?.ok_or_else(|| ServerError::FileNotFound {
        branch: branch.to_string(),
        path: path.to_string(),
    })
}

fn relocated(tx: &Tx<'_>, branch: &str, file_id: FileId, bookkeeping: usize) -> ServerResult<Response> {
    let info = staged_info(tx, branch, file_id, &file_id.to_string())?;
    Ok(Response::Relocated { info, bookkeeping })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, DenyAll};
    use arbor_archive::RevisionSelector;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Project::open(ServerConfig::in_memory("demo")).unwrap(), AllowAll)
    }

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn create(d: &Dispatcher, path: &str, body: &str) -> FileId {
        let request = Request::Create {
            branch: TRUNK_NAME.into(),
            path: path.into(),
            content: body.as_bytes().to_vec(),
            description: None,
            attributes: None,
        };
        match d.handle_at(&Identity::user("alice"), request, at(1_000)).unwrap() {
            Response::Created { file_id, revision } => {
                assert_eq!(revision.to_string(), "1.1");
                file_id
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn actions_follow_request_kind() {
        let get = Request::Get {
            branch: "dev".into(),
            path: "a.c".into(),
            selector: RevisionSelector::Default,
        };
        assert_eq!(action_for(&get).to_string(), "read:dev:a.c");
        let break_lock = Request::BreakLock {
            branch: "dev".into(),
            path: "a.c".into(),
            revision: "1.1".into(),
        };
        assert!(matches!(action_for(&break_lock), Action::Admin { .. }));
    }

    #[test]
    fn denied_request_changes_nothing() {
        let d = Dispatcher::new(Project::open(ServerConfig::in_memory("demo")).unwrap(), DenyAll);
        let err = d
            .handle(
                &Identity::admin("root"),
                Request::Create {
                    branch: TRUNK_NAME.into(),
                    path: "a.c".into(),
                    content: b"x".to_vec(),
                    description: None,
                    attributes: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied { .. }));
        assert!(d.project().overlay().files_on_branch(TRUNK_NAME).unwrap().is_empty());
    }

    #[test]
    fn create_places_file_in_namespace_and_storage() {
        let d = dispatcher();
        let id = create(&d, "src/lib/a.c", "int a;\n");
        let info = d.project().overlay().file_id_info(TRUNK_NAME, id).unwrap().unwrap();
        assert_eq!(info.path, "src/lib/a.c");
        assert!(d.project().repository().exists("src/lib/a.c").unwrap());
    }

    #[test]
    fn failed_archive_creation_rolls_back_namespace() {
        let d = dispatcher();
        create(&d, "a.c", "one\n");
        // Same archive key, different namespace name: the archive store refuses.
        d.project()
            .overlay()
            .transaction(at(1_500), |tx| -> ServerResult<()> {
                let before = staged_file(tx, TRUNK_NAME, "a.c")?;
                tx.rename_file_on_branch(TRUNK_NAME, before.file_id, "a.c", "b.c")?;
                Ok(())
            })
            .unwrap();
        let err = d
            .handle_at(
                &Identity::user("alice"),
                Request::Create {
                    branch: TRUNK_NAME.into(),
                    path: "a.c".into(),
                    content: b"two\n".to_vec(),
                    description: None,
                    attributes: None,
                },
                at(2_000),
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::Archive(ArchiveError::AlreadyExists { .. })));
        assert!(d.project().overlay().resolve_file(TRUNK_NAME, "a.c").is_err());
    }

    #[test]
    fn missing_path_is_file_not_found() {
        let d = dispatcher();
        let err = d
            .handle(
                &Identity::user("alice"),
                Request::Report {
                    branch: TRUNK_NAME.into(),
                    path: "nope/x.c".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::FileNotFound { .. }));
    }

    #[test]
    fn contraction_captures_comment_for_empty_description() {
        let attributes = ArchiveAttributes {
            expand_keywords: true,
            ..ArchiveAttributes::default()
        };
        let (content, description) = contract(
            &attributes,
            b"x $Revision: 1.4 $ $Comment: fix parser $\n".to_vec(),
            String::new(),
        );
        assert_eq!(content, b"x $Revision$ \n");
        assert_eq!(description, "fix parser");

        let (_, kept) = contract(&attributes, b"$Comment: ignored $".to_vec(), "given".into());
        assert_eq!(kept, "given");

        let plain = ArchiveAttributes::default();
        let (untouched, _) = contract(&plain, b"$Revision: 1.4 $".to_vec(), String::new());
        assert_eq!(untouched, b"$Revision: 1.4 $");
    }
}
