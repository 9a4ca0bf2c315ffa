//! The in-memory revision archive model.
//!
//! [`RevisionArchive`] owns one file's revision tree as an arena of
//! [`RevisionNode`]s plus the archive header (attributes, labels,
//! descriptions). Every operation here is pure in-memory; durability and
//! the staging-write discipline live in [`ArchiveFile`](crate::ArchiveFile).
//!
//! Storage layout of revision payloads:
//! - the trunk tip is stored in full
//! - older trunk revisions are reverse deltas against their successor
//! - branch revisions are forward deltas against their parent
//! - with deltas disabled (binary files) every revision is stored in full

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use arbor_delta::{apply_delta, compute_delta, EditScript};
use arbor_types::{ContentDigest, FileId, RevisionNumber, Timestamp};

use crate::attributes::ArchiveAttributes;
use crate::error::{ArchiveError, ArchiveResult};
use crate::info::{LabelInfo, LogfileInfo, RevisionInfo};
use crate::label::{validate_label_name, Label};
use crate::node::{LockRecord, RevisionNode, Storage};

/// Prefix of descriptions on revisions the server creates for its own
/// bookkeeping (renames, moves, deletes).
pub const INTERNAL_REVISION_PREFIX: &str = "[arbor-internal] ";

/// Label keyword value for a revision carrying more than one label.
pub const MULTIPLE_LABELS: &str = "MULTIPLE LABELS";

/// Archive-wide metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub file_id: FileId,
    pub short_workfile_name: String,
    /// Author of revision 1.1.
    pub owner: String,
    pub module_description: String,
    pub comment_prefix: String,
    pub attributes: ArchiveAttributes,
    pub is_obsolete: bool,
    pub labels: Vec<Label>,
    /// Newest check-in time seen by this archive.
    pub last_update: Timestamp,
}

/// Parameters of [`RevisionArchive::create`].
#[derive(Clone, Debug)]
pub struct CreateArchive {
    pub file_id: FileId,
    pub short_workfile_name: String,
    pub author: String,
    /// Description of revision 1.1.
    pub description: String,
    pub module_description: String,
    pub comment_prefix: String,
    pub attributes: ArchiveAttributes,
    pub timestamp: Timestamp,
}

impl CreateArchive {
    pub fn new(file_id: FileId, short_workfile_name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            file_id,
            short_workfile_name: short_workfile_name.into(),
            author: author.into(),
            description: "Initial revision.".into(),
            module_description: String::new(),
            comment_prefix: String::new(),
            attributes: ArchiveAttributes::default(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Options of [`RevisionArchive::check_in`].
#[derive(Clone, Debug, Default)]
pub struct CheckInOptions {
    /// Start a new branch even when the locked revision could be extended.
    pub force_branch: bool,
    /// Create a revision even when the content matches the locked revision.
    pub create_new_revision_if_equal: bool,
    /// Label to apply to the resulting revision.
    pub label: Option<String>,
    /// Move `label` if it already exists instead of failing.
    pub reuse_label: bool,
    /// Apply `label` as a floating label.
    pub float_label: bool,
    /// Keep a lock on the new revision.
    pub retain_lock: bool,
    /// Modification time of the workfile being checked in. Must not predate
    /// the archive's last update.
    pub input_timestamp: Option<Timestamp>,
    /// Check-in time; defaults to now.
    pub check_in_time: Option<Timestamp>,
}

/// Result of a check-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub revision: RevisionNumber,
    /// `false` when the content was unchanged and no revision was created.
    pub created: bool,
}

/// Result of a check-out: the locked revision and its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOut {
    pub revision: RevisionNumber,
    pub content: Vec<u8>,
}

/// Arguments of [`RevisionArchive::label_revision`].
#[derive(Clone, Debug, Default)]
pub struct LabelArgs {
    pub label: String,
    /// Target revision; the default revision when `None`.
    pub revision: Option<String>,
    pub reuse: bool,
    pub floating: bool,
    /// Bind `label` to whatever this existing label points at.
    pub duplicate_of: Option<String>,
}

impl LabelArgs {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn floating(mut self) -> Self {
        self.floating = true;
        self
    }

    pub fn reuse(mut self) -> Self {
        self.reuse = true;
        self
    }

    pub fn duplicate_of(mut self, source: impl Into<String>) -> Self {
        self.duplicate_of = Some(source.into());
        self
    }
}

/// Which revision a read addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevisionSelector {
    /// The trunk tip.
    Default,
    Revision(String),
    Label(String),
    /// Newest trunk revision checked in at or before the instant.
    AsOf(Timestamp),
}

/// One file's complete revision history.
#[derive(Clone, Debug)]
pub struct RevisionArchive {
    header: ArchiveHeader,
    nodes: Vec<RevisionNode>,
    modified: bool,
}

impl RevisionArchive {
    /// Create an archive holding revision 1.1 with `content`.
    pub fn create(params: CreateArchive, content: &[u8]) -> ArchiveResult<Self> {
        let header = ArchiveHeader {
            file_id: params.file_id,
            short_workfile_name: params.short_workfile_name,
            owner: params.author.clone(),
            module_description: params.module_description,
            comment_prefix: params.comment_prefix,
            attributes: params.attributes,
            is_obsolete: false,
            labels: Vec::new(),
            last_update: params.timestamp,
        };
        let mut archive = Self {
            header,
            nodes: Vec::new(),
            modified: true,
        };
        let (payload, compressed) = archive.pack_payload(content.to_vec())?;
        archive.nodes.push(RevisionNode {
            number: RevisionNumber::root(),
            parent: None,
            author: params.author,
            check_in_time: params.timestamp,
            edit_time: params.timestamp,
            description: params.description,
            digest: ContentDigest::of(content),
            content_len: content.len() as u64,
            lock: None,
            storage: Storage::Full,
            compressed,
            payload,
            data_offset: 0,
        });
        debug!(file_id = %archive.header.file_id, len = content.len(), "archive created");
        Ok(archive)
    }

    pub(crate) fn from_parts(header: ArchiveHeader, nodes: Vec<RevisionNode>) -> Self {
        Self {
            header,
            nodes,
            modified: false,
        }
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn nodes(&self) -> &[RevisionNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [RevisionNode] {
        &mut self.nodes
    }

    pub fn file_id(&self) -> FileId {
        self.header.file_id
    }

    pub fn attributes(&self) -> ArchiveAttributes {
        self.header.attributes
    }

    pub fn revision_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: usize) -> &RevisionNode {
        &self.nodes[idx]
    }

    /// Returns and clears the modified flag.
    pub(crate) fn take_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }

    // ----------------------------------------------------------------
    // Lookup
    // ----------------------------------------------------------------

    pub fn index_of(&self, number: &RevisionNumber) -> Option<usize> {
        self.nodes.iter().position(|n| &n.number == number)
    }

    /// Resolve a dotted revision string to a node index.
    pub fn find_revision(&self, revision: &str) -> ArchiveResult<usize> {
        let number = RevisionNumber::parse(revision)?;
        self.index_of(&number)
            .ok_or_else(|| ArchiveError::RevisionNotFound {
                revision: revision.to_string(),
            })
    }

    /// Newest revision on a line, if the line exists.
    pub fn line_tip(&self, line: &[u32]) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.number.is_on_line(line))
            .max_by_key(|(_, n)| n.number.sequence())
            .map(|(idx, _)| idx)
    }

    /// Index of the trunk tip, the archive's default revision.
    pub fn trunk_tip(&self) -> usize {
        self.line_tip(&[1]).unwrap_or(0)
    }

    pub fn default_revision(&self) -> &RevisionNumber {
        &self.nodes[self.trunk_tip()].number
    }

    /// Returns `true` if nothing follows `idx` on its own line.
    pub fn is_line_tip(&self, idx: usize) -> bool {
        let successor = self.nodes[idx].number.successor();
        self.index_of(&successor).is_none()
    }

    fn next_branch_index(&self, idx: usize) -> u32 {
        let fork = self.nodes[idx].number.components();
        self.nodes
            .iter()
            .map(|n| n.number.components())
            .filter(|c| c.len() == fork.len() + 2 && c.starts_with(fork))
            .map(|c| c[fork.len()])
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Walk from `idx` toward the root and return the first revision checked
    /// in at or before `as_of`.
    pub fn newest_ancestor_as_of(&self, idx: usize, as_of: Timestamp) -> Option<usize> {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            if self.nodes[i].check_in_time <= as_of {
                return Some(i);
            }
            cursor = self.nodes[i].parent;
        }
        None
    }

    pub fn find_label(&self, name: &str) -> Option<&Label> {
        self.header.labels.iter().find(|l| l.name == name)
    }

    /// Resolve a label to a node index.
    pub fn resolve_label(&self, name: &str) -> ArchiveResult<usize> {
        let not_found = || ArchiveError::LabelNotFound {
            label: name.to_string(),
        };
        let label = self.find_label(name).ok_or_else(not_found)?;
        self.resolve_label_target(label).ok_or_else(not_found)
    }

    fn resolve_label_target(&self, label: &Label) -> Option<usize> {
        if label.floating {
            self.line_tip(&label.line()?)
        } else {
            let number = RevisionNumber::parse(&label.target).ok()?;
            self.index_of(&number)
        }
    }

    pub fn resolve(&self, selector: &RevisionSelector) -> ArchiveResult<usize> {
        match selector {
            RevisionSelector::Default => Ok(self.trunk_tip()),
            RevisionSelector::Revision(rev) => self.find_revision(rev),
            RevisionSelector::Label(label) => self.resolve_label(label),
            RevisionSelector::AsOf(as_of) => self
                .newest_ancestor_as_of(self.trunk_tip(), *as_of)
                .ok_or_else(|| ArchiveError::RevisionNotFound {
                    revision: format!("as of {as_of}"),
                }),
        }
    }

    /// Fixed labels bound to this exact revision.
    pub fn fixed_labels_on(&self, idx: usize) -> Vec<&str> {
        let number = self.nodes[idx].number.to_string();
        self.header
            .labels
            .iter()
            .filter(|l| !l.floating && l.target == number)
            .map(|l| l.name.as_str())
            .collect()
    }

    /// Floating labels currently resolving to this revision.
    pub fn floating_labels_on(&self, idx: usize) -> Vec<&str> {
        self.header
            .labels
            .iter()
            .filter(|l| l.floating && self.resolve_label_target(l) == Some(idx))
            .map(|l| l.name.as_str())
            .collect()
    }

    /// Value of the `Label` keyword for a revision.
    pub fn label_keyword_value(&self, idx: usize) -> Option<String> {
        let fixed = self.fixed_labels_on(idx);
        match fixed.len() {
            0 => self.floating_labels_on(idx).first().map(|s| s.to_string()),
            1 => Some(fixed[0].to_string()),
            _ => Some(MULTIPLE_LABELS.to_string()),
        }
    }

    // ----------------------------------------------------------------
    // Content
    // ----------------------------------------------------------------

    /// Rebuild the full content of revision `idx`, verifying its digest.
    pub fn content(&self, idx: usize) -> ArchiveResult<Vec<u8>> {
        let mut chain = vec![idx];
        let mut cursor = idx;
        while let Storage::Delta { base } = self.nodes[cursor].storage {
            if chain.len() > self.nodes.len() {
                return Err(ArchiveError::corrupt("delta chain does not terminate"));
            }
            chain.push(base);
            cursor = base;
        }

        let mut content = Vec::new();
        while let Some(i) = chain.pop() {
            let raw = self.unpack_payload(i)?;
            content = match self.nodes[i].storage {
                Storage::Full => raw,
                Storage::Delta { .. } => {
                    let script = EditScript::from_bytes(&raw)?;
                    apply_delta(&content, &script)?
                }
            };
        }

        let node = &self.nodes[idx];
        if ContentDigest::of(&content) != node.digest {
            return Err(ArchiveError::corrupt(format!(
                "digest mismatch reconstructing revision {}",
                node.number
            )));
        }
        Ok(content)
    }

    pub fn get_revision(&self, selector: &RevisionSelector) -> ArchiveResult<Vec<u8>> {
        self.content(self.resolve(selector)?)
    }

    fn pack_payload(&self, raw: Vec<u8>) -> ArchiveResult<(Vec<u8>, bool)> {
        if self.header.attributes.compress && !raw.is_empty() {
            let packed = zstd::encode_all(raw.as_slice(), 3)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            if packed.len() < raw.len() {
                return Ok((packed, true));
            }
        }
        Ok((raw, false))
    }

    fn unpack_payload(&self, idx: usize) -> ArchiveResult<Vec<u8>> {
        let node = &self.nodes[idx];
        if node.compressed {
            zstd::decode_all(node.payload.as_slice())
                .map_err(|e| ArchiveError::Compression(e.to_string()))
        } else {
            Ok(node.payload.clone())
        }
    }

    fn store_delta(&mut self, idx: usize, base: usize, base_content: &[u8], content: &[u8]) -> ArchiveResult<()> {
        let script = compute_delta(base_content, content);
        let (payload, compressed) = self.pack_payload(script.to_bytes()?)?;
        let node = &mut self.nodes[idx];
        node.storage = Storage::Delta { base };
        node.payload = payload;
        node.compressed = compressed;
        Ok(())
    }

    // ----------------------------------------------------------------
    // Locks
    // ----------------------------------------------------------------

    pub fn lock_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.lock.is_some()).count()
    }

    /// Comma separated, sorted, de-duplicated lock holders.
    pub fn locked_by_string(&self) -> String {
        let mut users: Vec<&str> = self.nodes.iter().filter_map(|n| n.locked_by()).collect();
        users.sort_unstable();
        users.dedup();
        users.join(", ")
    }

    fn ensure_lockable(&self, user: &str, idx: usize) -> ArchiveResult<()> {
        let node = &self.nodes[idx];
        if let Some(holder) = node.locked_by() {
            if holder != user {
                return Err(ArchiveError::AlreadyLocked {
                    revision: node.number.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
        if self.header.attributes.exclusive_lock {
            if let Some(other) = self.nodes.iter().find(|n| n.locked_by().is_some_and(|u| u != user)) {
                return Err(ArchiveError::AlreadyLocked {
                    revision: other.number.to_string(),
                    holder: other.locked_by().unwrap_or_default().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Lock `revision` for `user`. Repeating the call is a no-op.
    pub fn lock_revision(&mut self, user: &str, revision: &str, at: Timestamp) -> ArchiveResult<RevisionNumber> {
        let idx = self.find_revision(revision)?;
        self.ensure_lockable(user, idx)?;
        let node = &mut self.nodes[idx];
        if node.lock.is_none() {
            node.lock = Some(LockRecord {
                user: user.to_string(),
                locked_at: at,
            });
            self.modified = true;
            debug!(user, revision, "revision locked");
        }
        Ok(self.nodes[idx].number.clone())
    }

    /// Lock `revision` and return its content.
    pub fn check_out(&mut self, user: &str, revision: &str, comment: &str, at: Timestamp) -> ArchiveResult<CheckOut> {
        let number = self.lock_revision(user, revision, at)?;
        let idx = self.find_revision(revision)?;
        debug!(user, revision, comment, "revision checked out");
        Ok(CheckOut {
            revision: number,
            content: self.content(idx)?,
        })
    }

    pub fn unlock_revision(&mut self, user: &str, revision: &str) -> ArchiveResult<()> {
        let idx = self.find_revision(revision)?;
        let node = &mut self.nodes[idx];
        if node.locked_by() != Some(user) {
            return Err(ArchiveError::NotLocked {
                revision: revision.to_string(),
                user: user.to_string(),
            });
        }
        node.lock = None;
        self.modified = true;
        debug!(user, revision, "revision unlocked");
        Ok(())
    }

    /// Remove a lock regardless of who holds it. Returns the former holder.
    pub fn break_lock(&mut self, admin: &str, revision: &str) -> ArchiveResult<String> {
        let idx = self.find_revision(revision)?;
        let node = &mut self.nodes[idx];
        let Some(lock) = node.lock.take() else {
            return Err(ArchiveError::NotLocked {
                revision: revision.to_string(),
                user: admin.to_string(),
            });
        };
        self.modified = true;
        warn!(admin, revision, holder = %lock.user, "lock broken");
        Ok(lock.user)
    }

    // ----------------------------------------------------------------
    // Check-in
    // ----------------------------------------------------------------

    /// Check in `content` against `locked_revision`.
    ///
    /// Extends the locked revision's line when it is that line's tip and no
    /// branch is forced; otherwise starts branch `<locked>.<next index>.1`.
    pub fn check_in(
        &mut self,
        user: &str,
        locked_revision: &str,
        content: &[u8],
        comment: &str,
        options: &CheckInOptions,
    ) -> ArchiveResult<CheckInOutcome> {
        let idx = self.find_revision(locked_revision)?;
        let check_in_time = options.check_in_time.unwrap_or_else(Timestamp::now);

        if let Some(input) = options.input_timestamp {
            if input < self.header.last_update {
                return Err(ArchiveError::StaleTimestamp {
                    supplied: input.to_string(),
                    last_update: self.header.last_update.to_string(),
                });
            }
        }

        let holds_lock = self.nodes[idx].locked_by() == Some(user);
        if self.header.attributes.check_lock && !holds_lock {
            return Err(ArchiveError::NotLocked {
                revision: locked_revision.to_string(),
                user: user.to_string(),
            });
        }

        if let Some(label) = &options.label {
            validate_label_name(label)?;
            if !options.reuse_label && self.find_label(label).is_some() {
                return Err(ArchiveError::DuplicateLabel {
                    label: label.clone(),
                });
            }
        }

        let digest = ContentDigest::of(content);
        if digest == self.nodes[idx].digest && !options.create_new_revision_if_equal {
            if holds_lock && !options.retain_lock {
                self.nodes[idx].lock = None;
            }
            if let Some(label) = &options.label {
                self.put_label(label, idx, options.float_label);
            }
            self.modified = true;
            debug!(user, revision = locked_revision, "check-in with unchanged content");
            return Ok(CheckInOutcome {
                revision: self.nodes[idx].number.clone(),
                created: false,
            });
        }

        let base_content = self.content(idx)?;
        let extend = !options.force_branch && self.is_line_tip(idx);
        let number = if extend {
            self.nodes[idx].number.successor()
        } else {
            self.nodes[idx].number.branch_start(self.next_branch_index(idx))
        };

        let new_idx = self.nodes.len();
        let (payload, compressed) = self.pack_payload(content.to_vec())?;
        self.nodes.push(RevisionNode {
            number: number.clone(),
            parent: Some(idx),
            author: user.to_string(),
            check_in_time,
            edit_time: options.input_timestamp.unwrap_or(check_in_time),
            description: comment.to_string(),
            digest,
            content_len: content.len() as u64,
            lock: None,
            storage: Storage::Full,
            compressed,
            payload,
            data_offset: 0,
        });

        if self.header.attributes.stores_deltas() {
            if number.is_trunk() {
                // New trunk tip is stored in full; the old tip becomes a
                // reverse delta against it.
                self.store_delta(idx, new_idx, content, &base_content)?;
            } else {
                self.store_delta(new_idx, idx, &base_content, content)?;
            }
        }

        if holds_lock {
            self.nodes[idx].lock = None;
        }
        if options.retain_lock {
            self.nodes[new_idx].lock = Some(LockRecord {
                user: user.to_string(),
                locked_at: check_in_time,
            });
        }
        if let Some(label) = &options.label {
            self.put_label(label, new_idx, options.float_label);
        }
        self.header.last_update = self.header.last_update.max(check_in_time);
        self.modified = true;

        debug!(
            user,
            locked = locked_revision,
            revision = %number,
            len = content.len(),
            "revision checked in"
        );
        Ok(CheckInOutcome {
            revision: number,
            created: true,
        })
    }

    // ----------------------------------------------------------------
    // Labels
    // ----------------------------------------------------------------

    fn put_label(&mut self, name: &str, idx: usize, floating: bool) {
        let number = &self.nodes[idx].number;
        let label = if floating {
            Label::floating(name, number)
        } else {
            Label::fixed(name, number)
        };
        self.insert_label(label);
    }

    fn insert_label(&mut self, label: Label) {
        match self.header.labels.iter_mut().find(|l| l.name == label.name) {
            Some(existing) => *existing = label,
            None => self.header.labels.push(label),
        }
        self.modified = true;
    }

    /// Apply a label. Returns `Ok(false)` when the label exists and reuse was
    /// not requested, when the target does not resolve, or when the
    /// duplicate source label does not exist.
    pub fn label_revision(&mut self, user: &str, args: &LabelArgs) -> ArchiveResult<bool> {
        validate_label_name(&args.label)?;
        if !args.reuse && self.find_label(&args.label).is_some() {
            debug!(user, label = %args.label, "label exists");
            return Ok(false);
        }

        if let Some(source) = &args.duplicate_of {
            let Some(existing) = self.find_label(source).cloned() else {
                debug!(user, source = %source, "duplicate source label missing");
                return Ok(false);
            };
            self.insert_label(Label {
                name: args.label.clone(),
                ..existing
            });
            debug!(user, label = %args.label, source = %source, "label duplicated");
            return Ok(true);
        }

        let idx = match &args.revision {
            None => self.trunk_tip(),
            Some(rev) => match RevisionNumber::parse(rev).ok().and_then(|n| self.index_of(&n)) {
                Some(idx) => idx,
                None => {
                    debug!(user, label = %args.label, revision = %rev, "label target missing");
                    return Ok(false);
                }
            },
        };
        self.put_label(&args.label, idx, args.floating);
        debug!(user, label = %args.label, revision = %self.nodes[idx].number, floating = args.floating, "label applied");
        Ok(true)
    }

    /// Remove a label. Returns `Ok(false)` if it was not there.
    pub fn unlabel_revision(&mut self, user: &str, label: &str) -> ArchiveResult<bool> {
        let before = self.header.labels.len();
        self.header.labels.retain(|l| l.name != label);
        let removed = self.header.labels.len() != before;
        if removed {
            self.modified = true;
            debug!(user, label, "label removed");
        }
        Ok(removed)
    }

    // ----------------------------------------------------------------
    // Metadata
    // ----------------------------------------------------------------

    pub fn set_attributes(&mut self, user: &str, attributes: ArchiveAttributes) -> bool {
        if self.header.attributes == attributes {
            return false;
        }
        self.header.attributes = attributes;
        self.modified = true;
        debug!(user, flags = ?attributes.flag_names(), "attributes changed");
        true
    }

    pub fn set_comment_prefix(&mut self, user: &str, prefix: &str) -> bool {
        if self.header.comment_prefix == prefix {
            return false;
        }
        self.header.comment_prefix = prefix.to_string();
        self.modified = true;
        debug!(user, "comment prefix changed");
        true
    }

    pub fn set_module_description(&mut self, user: &str, description: &str) -> bool {
        if self.header.module_description == description {
            return false;
        }
        self.header.module_description = description.to_string();
        self.modified = true;
        debug!(user, "module description changed");
        true
    }

    pub fn set_revision_description(&mut self, user: &str, revision: &str, description: &str) -> ArchiveResult<bool> {
        let idx = self.find_revision(revision)?;
        if self.nodes[idx].description == description {
            return Ok(false);
        }
        self.nodes[idx].description = description.to_string();
        self.modified = true;
        debug!(user, revision, "revision description changed");
        Ok(true)
    }

    pub fn set_is_obsolete(&mut self, user: &str, obsolete: bool) -> bool {
        if self.header.is_obsolete == obsolete {
            return false;
        }
        self.header.is_obsolete = obsolete;
        self.modified = true;
        debug!(user, obsolete, "obsolete flag changed");
        true
    }

    // ----------------------------------------------------------------
    // Bookkeeping revisions
    // ----------------------------------------------------------------

    /// Append an unchanged trunk revision whose description records a
    /// storage-level event. A lock the caller holds on the old tip moves to
    /// the new one.
    fn append_bookkeeping_revision(&mut self, user: &str, event: &str, at: Timestamp) -> ArchiveResult<RevisionNumber> {
        let tip = self.trunk_tip();
        if let Some(holder) = self.nodes[tip].locked_by() {
            if holder != user {
                return Err(ArchiveError::AlreadyLocked {
                    revision: self.nodes[tip].number.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
        let lock = self.nodes[tip].lock.take();
        let digest = self.nodes[tip].digest;
        let content = self.content(tip)?;
        let number = self.nodes[tip].number.successor();
        let new_idx = self.nodes.len();
        let (payload, compressed) = self.pack_payload(content.clone())?;
        self.nodes.push(RevisionNode {
            number: number.clone(),
            parent: Some(tip),
            author: user.to_string(),
            check_in_time: at,
            edit_time: at,
            description: format!("{INTERNAL_REVISION_PREFIX}{event}"),
            digest,
            content_len: content.len() as u64,
            lock,
            storage: Storage::Full,
            compressed,
            payload,
            data_offset: 0,
        });
        if self.header.attributes.stores_deltas() {
            self.store_delta(tip, new_idx, &content, &content)?;
        }
        self.header.last_update = self.header.last_update.max(at);
        self.modified = true;
        Ok(number)
    }

    /// Record a rename of the workfile. Returns the number of bookkeeping
    /// revisions added.
    pub fn rename_archive(&mut self, user: &str, old_name: &str, new_name: &str, at: Timestamp) -> ArchiveResult<usize> {
        if self.header.short_workfile_name != old_name {
            return Err(ArchiveError::WorkfileNameMismatch {
                expected: old_name.to_string(),
                actual: self.header.short_workfile_name.clone(),
            });
        }
        let event = format!("File renamed from: [{old_name}] to [{new_name}].");
        let number = self.append_bookkeeping_revision(user, &event, at)?;
        self.header.short_workfile_name = new_name.to_string();
        debug!(user, old_name, new_name, revision = %number, "archive renamed");
        Ok(1)
    }

    /// Record a move of the workfile between directories.
    pub fn move_archive(&mut self, user: &str, old_path: &str, new_path: &str, at: Timestamp) -> ArchiveResult<usize> {
        let event = format!("File moved from: [{old_path}] to [{new_path}].");
        let number = self.append_bookkeeping_revision(user, &event, at)?;
        debug!(user, old_path, new_path, revision = %number, "archive moved");
        Ok(1)
    }

    /// Record that the archive is being moved into the cemetery.
    pub fn delete_archive(&mut self, user: &str, old_path: &str, cemetery_name: &str, at: Timestamp) -> ArchiveResult<usize> {
        let event = format!("Deleted: [{old_path}] to cemetery [{cemetery_name}].");
        let number = self.append_bookkeeping_revision(user, &event, at)?;
        debug!(user, old_path, cemetery_name, revision = %number, "archive deleted");
        Ok(1)
    }

    // ----------------------------------------------------------------
    // Reports
    // ----------------------------------------------------------------

    /// Most recent check-in, by check-in time.
    pub fn last_check_in(&self) -> &RevisionNode {
        let mut newest = &self.nodes[0];
        for node in &self.nodes[1..] {
            if node.check_in_time >= newest.check_in_time {
                newest = node;
            }
        }
        newest
    }

    pub fn revision_info(&self, idx: usize) -> RevisionInfo {
        let node = &self.nodes[idx];
        RevisionInfo {
            number: node.number.clone(),
            author: node.author.clone(),
            check_in_time: node.check_in_time,
            edit_time: node.edit_time,
            description: node.description.clone(),
            digest: node.digest,
            content_len: node.content_len,
            locked_by: node.locked_by().map(str::to_string),
            depth: node.depth(),
        }
    }

    /// Snapshot of the archive's metadata and every revision.
    pub fn info(&self) -> LogfileInfo {
        let labels = self
            .header
            .labels
            .iter()
            .map(|l| LabelInfo {
                name: l.name.clone(),
                revision: self
                    .resolve_label_target(l)
                    .map(|idx| self.nodes[idx].number.clone()),
                floating: l.floating,
            })
            .collect();
        let last = self.last_check_in();
        LogfileInfo {
            file_id: self.header.file_id,
            short_workfile_name: self.header.short_workfile_name.clone(),
            owner: self.header.owner.clone(),
            module_description: self.header.module_description.clone(),
            comment_prefix: self.header.comment_prefix.clone(),
            attributes: self.header.attributes,
            is_obsolete: self.header.is_obsolete,
            default_revision: self.default_revision().clone(),
            default_digest: self.nodes[self.trunk_tip()].digest,
            last_check_in: last.check_in_time,
            last_edit_by: last.author.clone(),
            lock_count: self.lock_count(),
            locked_by: self.locked_by_string(),
            labels,
            revisions: (0..self.nodes.len()).map(|i| self.revision_info(i)).collect(),
        }
    }
}
