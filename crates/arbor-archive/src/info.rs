use serde::{Deserialize, Serialize};

use arbor_types::{ContentDigest, FileId, RevisionNumber, Timestamp};

use crate::attributes::ArchiveAttributes;

/// Metadata of one revision, without its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub number: RevisionNumber,
    pub author: String,
    pub check_in_time: Timestamp,
    pub edit_time: Timestamp,
    pub description: String,
    pub digest: ContentDigest,
    pub content_len: u64,
    pub locked_by: Option<String>,
    pub depth: usize,
}

/// A label with its target resolved at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub name: String,
    pub revision: Option<RevisionNumber>,
    pub floating: bool,
}

/// Point-in-time snapshot of an archive's metadata, as reported to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogfileInfo {
    pub file_id: FileId,
    pub short_workfile_name: String,
    pub owner: String,
    pub module_description: String,
    pub comment_prefix: String,
    pub attributes: ArchiveAttributes,
    pub is_obsolete: bool,
    pub default_revision: RevisionNumber,
    pub default_digest: ContentDigest,
    pub last_check_in: Timestamp,
    pub last_edit_by: String,
    pub lock_count: usize,
    pub locked_by: String,
    pub labels: Vec<LabelInfo>,
    pub revisions: Vec<RevisionInfo>,
}

impl LogfileInfo {
    pub fn revision(&self, number: &RevisionNumber) -> Option<&RevisionInfo> {
        self.revisions.iter().find(|r| &r.number == number)
    }
}
