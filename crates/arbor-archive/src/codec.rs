//! Byte format of a stored archive.
//!
//! ```text
//! "ARBA" | version: u32 BE | varint len | bincode header
//! repeated per revision, in arena order:
//!     varint len | bincode revision meta | crc32(payload): u32 BE | payload
//! ```
//!
//! The last revision's payload ends exactly at the end of the file. Any
//! trailing or missing bytes make the archive corrupt.

use serde::{Deserialize, Serialize};

use arbor_types::{ContentDigest, RevisionNumber, Timestamp};

use crate::archive::{ArchiveHeader, RevisionArchive};
use crate::error::{ArchiveError, ArchiveResult};
use crate::node::{LockRecord, RevisionNode, Storage};

pub const MAGIC: &[u8; 4] = b"ARBA";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct HeaderRecord {
    header: ArchiveHeader,
    revision_count: u32,
}

#[derive(Serialize, Deserialize)]
enum StorageRecord {
    Full,
    Delta { base: u32 },
}

#[derive(Serialize, Deserialize)]
struct RevisionRecord {
    number: RevisionNumber,
    parent: Option<u32>,
    author: String,
    check_in_time: Timestamp,
    edit_time: Timestamp,
    description: String,
    digest: ContentDigest,
    content_len: u64,
    lock: Option<LockRecord>,
    storage: StorageRecord,
    compressed: bool,
    data_len: u64,
}

fn to_bincode<T: Serialize>(value: &T) -> ArchiveResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ArchiveError::Serialization(e.to_string()))
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> ArchiveResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(ArchiveError::corrupt("varint overflow"));
        }
    }
    Err(ArchiveError::corrupt("truncated varint"))
}

/// Serialize an archive, recording each payload's offset on its node.
pub fn encode(archive: &mut RevisionArchive) -> ArchiveResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());

    let header = to_bincode(&HeaderRecord {
        header: archive.header().clone(),
        revision_count: archive.revision_count() as u32,
    })?;
    encode_varint(&mut out, header.len() as u64);
    out.extend_from_slice(&header);

    for node in archive.nodes_mut() {
        let meta = to_bincode(&RevisionRecord {
            number: node.number.clone(),
            parent: node.parent.map(|p| p as u32),
            author: node.author.clone(),
            check_in_time: node.check_in_time,
            edit_time: node.edit_time,
            description: node.description.clone(),
            digest: node.digest,
            content_len: node.content_len,
            lock: node.lock.clone(),
            storage: match node.storage {
                Storage::Full => StorageRecord::Full,
                Storage::Delta { base } => StorageRecord::Delta { base: base as u32 },
            },
            compressed: node.compressed,
            data_len: node.payload.len() as u64,
        })?;
        encode_varint(&mut out, meta.len() as u64);
        out.extend_from_slice(&meta);
        out.extend_from_slice(&crc32fast::hash(&node.payload).to_be_bytes());
        node.data_offset = out.len() as u64;
        out.extend_from_slice(&node.payload);
    }

    verify_tail(archive, out.len() as u64)?;
    Ok(out)
}

/// The integrity rule: the last revision's payload ends at `total_len`.
pub fn verify_tail(archive: &RevisionArchive, total_len: u64) -> ArchiveResult<()> {
    let Some(last) = archive.nodes().last() else {
        return Err(ArchiveError::corrupt("archive has no revisions"));
    };
    let end = last.data_offset() + last.data_len();
    if end != total_len {
        return Err(ArchiveError::corrupt(format!(
            "last revision {} ends at {end}, archive is {total_len} bytes",
            last.number
        )));
    }
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> ArchiveResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| ArchiveError::corrupt(format!("truncated {what} at offset {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn varint(&mut self) -> ArchiveResult<usize> {
        let (value, used) = decode_varint(&self.data[self.pos..])?;
        self.pos += used;
        usize::try_from(value).map_err(|_| ArchiveError::corrupt("length overflow"))
    }

    fn u32_be(&mut self, what: &str) -> ArchiveResult<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bincode<T: for<'de> Deserialize<'de>>(&mut self, what: &str) -> ArchiveResult<T> {
        let len = self.varint()?;
        let bytes = self.take(len, what)?;
        bincode::deserialize(bytes).map_err(|e| ArchiveError::corrupt(format!("bad {what}: {e}")))
    }
}

/// Parse and validate a stored archive.
pub fn decode(data: &[u8]) -> ArchiveResult<RevisionArchive> {
    let mut cursor = Cursor { data, pos: 0 };
    if cursor.take(4, "magic")? != MAGIC {
        return Err(ArchiveError::corrupt("bad magic"));
    }
    let version = cursor.u32_be("version")?;
    if version != FORMAT_VERSION {
        return Err(ArchiveError::corrupt(format!("unsupported format version {version}")));
    }

    let header: HeaderRecord = cursor.bincode("header")?;
    let count = header.revision_count as usize;
    let mut nodes: Vec<RevisionNode> = Vec::with_capacity(count);

    for idx in 0..count {
        let record: RevisionRecord = cursor.bincode("revision record")?;
        let expected_crc = cursor.u32_be("checksum")?;
        let data_offset = cursor.pos as u64;
        let len = usize::try_from(record.data_len).map_err(|_| ArchiveError::corrupt("length overflow"))?;
        let payload = cursor.take(len, "payload")?.to_vec();
        if crc32fast::hash(&payload) != expected_crc {
            return Err(ArchiveError::corrupt(format!(
                "checksum mismatch on revision {}",
                record.number
            )));
        }

        let parent = record.parent.map(|p| p as usize);
        check_ancestry(&nodes, idx, &record.number, parent)?;
        let storage = match record.storage {
            StorageRecord::Full => Storage::Full,
            StorageRecord::Delta { base } => {
                let base = base as usize;
                if base >= count || base == idx {
                    return Err(ArchiveError::corrupt(format!(
                        "revision {} has invalid delta base {base}",
                        record.number
                    )));
                }
                Storage::Delta { base }
            }
        };

        nodes.push(RevisionNode {
            number: record.number,
            parent,
            author: record.author,
            check_in_time: record.check_in_time,
            edit_time: record.edit_time,
            description: record.description,
            digest: record.digest,
            content_len: record.content_len,
            lock: record.lock,
            storage,
            compressed: record.compressed,
            payload,
            data_offset,
        });
    }

    let archive = RevisionArchive::from_parts(header.header, nodes);
    verify_tail(&archive, data.len() as u64)?;
    Ok(archive)
}

/// Every node other than the root must name an earlier node whose number is
/// its structural parent.
fn check_ancestry(
    nodes: &[RevisionNode],
    idx: usize,
    number: &RevisionNumber,
    parent: Option<usize>,
) -> ArchiveResult<()> {
    match (idx, parent) {
        (0, None) if *number == RevisionNumber::root() => Ok(()),
        (0, _) => Err(ArchiveError::corrupt("first revision must be the 1.1 root")),
        (_, Some(p)) if p < idx && Some(&nodes[p].number) == number.parent().as_ref() => Ok(()),
        _ => Err(ArchiveError::corrupt(format!("revision {number} is unreachable from the root"))),
    }
}
