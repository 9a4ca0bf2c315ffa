use serde::{Deserialize, Serialize};

use arbor_types::{ContentDigest, RevisionNumber, Timestamp};

/// Exclusive claim by one user on one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub user: String,
    pub locked_at: Timestamp,
}

/// How a revision's payload rebuilds its content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// The payload is the full content.
    Full,
    /// The payload is an edit script applied to the content of node `base`.
    Delta { base: usize },
}

/// One revision in the arena.
///
/// Nodes are addressed by their index in the archive's node list, which is
/// also their physical order in the stored archive. `parent` is the index of
/// the revision this one was derived from; ancestry never changes after a
/// node is appended.
#[derive(Clone, Debug)]
pub struct RevisionNode {
    pub number: RevisionNumber,
    pub parent: Option<usize>,
    pub author: String,
    pub check_in_time: Timestamp,
    /// Modification time of the workfile that was checked in.
    pub edit_time: Timestamp,
    pub description: String,
    pub digest: ContentDigest,
    pub content_len: u64,
    pub lock: Option<LockRecord>,
    pub storage: Storage,
    pub compressed: bool,
    pub(crate) payload: Vec<u8>,
    /// Offset of the payload in the last encoded form of the archive.
    pub(crate) data_offset: u64,
}

impl RevisionNode {
    pub fn depth(&self) -> usize {
        self.number.depth()
    }

    pub fn locked_by(&self) -> Option<&str> {
        self.lock.as_ref().map(|l| l.user.as_str())
    }

    /// Offset of this revision's stored payload within the archive file.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Length of this revision's stored payload.
    pub fn data_len(&self) -> u64 {
        self.payload.len() as u64
    }
}
