//! Edit scripts: the stored form of a delta.

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::error::{DeltaError, DeltaResult};

/// Fixed per-op overhead used when deciding whether a script beats a full copy.
const OP_OVERHEAD: usize = 16;

/// One step of an [`EditScript`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    /// Copy `len` bytes starting at `offset` of the base.
    Copy { offset: u64, len: u64 },
    /// Emit these bytes literally.
    Insert(Vec<u8>),
}

/// Instructions that rebuild a target from a known base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditScript {
    pub base_len: u64,
    pub target_len: u64,
    pub ops: Vec<EditOp>,
}

impl EditScript {
    /// A script that ignores the base and emits `target` verbatim.
    pub fn full(base_len: usize, target: &[u8]) -> Self {
        let ops = if target.is_empty() {
            Vec::new()
        } else {
            vec![EditOp::Insert(target.to_vec())]
        };
        Self {
            base_len: base_len as u64,
            target_len: target.len() as u64,
            ops,
        }
    }

    /// Number of literal bytes carried by the script.
    pub fn literal_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                EditOp::Insert(bytes) => bytes.len(),
                EditOp::Copy { .. } => 0,
            })
            .sum()
    }

    /// Returns `true` if the script reproduces the base unchanged.
    pub fn is_identity(&self) -> bool {
        match self.ops.as_slice() {
            [] => self.base_len == 0 && self.target_len == 0,
            [EditOp::Copy { offset: 0, len }] => *len == self.base_len && *len == self.target_len,
            _ => false,
        }
    }

    pub fn to_bytes(&self) -> DeltaResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| DeltaError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> DeltaResult<Self> {
        bincode::deserialize(data).map_err(|e| DeltaError::Serialization(e.to_string()))
    }

    fn push(&mut self, op: EditOp) {
        if let Some(last) = self.ops.last_mut() {
            match (last, &op) {
                (EditOp::Copy { offset, len }, EditOp::Copy { offset: o, len: l })
                    if *offset + *len == *o =>
                {
                    *len += *l;
                    return;
                }
                (EditOp::Insert(bytes), EditOp::Insert(more)) => {
                    bytes.extend_from_slice(more);
                    return;
                }
                _ => {}
            }
        }
        self.ops.push(op);
    }
}

fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|b| *b == b'\n').collect()
}

fn line_offsets(lines: &[&[u8]]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(lines.len() + 1);
    let mut pos = 0;
    offsets.push(0);
    for line in lines {
        pos += line.len();
        offsets.push(pos);
    }
    offsets
}

/// Compute a script that turns `base` into `target`.
///
/// Line-oriented: unchanged lines become copies, everything else becomes
/// literal inserts. If the result would be bigger than simply storing
/// `target`, a single-insert script is returned instead.
pub fn compute_delta(base: &[u8], target: &[u8]) -> EditScript {
    let old_lines = split_lines(base);
    let new_lines = split_lines(target);
    let old_offsets = line_offsets(&old_lines);
    let new_offsets = line_offsets(&new_lines);

    let mut script = EditScript {
        base_len: base.len() as u64,
        target_len: target.len() as u64,
        ops: Vec::new(),
    };

    for op in capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                let start = old_offsets[old_range.start];
                let end = old_offsets[old_range.end];
                script.push(EditOp::Copy {
                    offset: start as u64,
                    len: (end - start) as u64,
                });
            }
            DiffTag::Insert | DiffTag::Replace => {
                let start = new_offsets[new_range.start];
                let end = new_offsets[new_range.end];
                script.push(EditOp::Insert(target[start..end].to_vec()));
            }
            DiffTag::Delete => {}
        }
    }

    let cost = script.literal_bytes() + script.ops.len() * OP_OVERHEAD;
    if cost >= target.len() + OP_OVERHEAD {
        return EditScript::full(base.len(), target);
    }
    script
}

/// Replay `script` against `base`.
pub fn apply_delta(base: &[u8], script: &EditScript) -> DeltaResult<Vec<u8>> {
    if base.len() as u64 != script.base_len {
        return Err(DeltaError::BaseMismatch {
            expected: script.base_len,
            actual: base.len() as u64,
        });
    }

    let mut out = Vec::with_capacity(script.target_len as usize);
    for op in &script.ops {
        match op {
            EditOp::Copy { offset, len } => {
                let end = offset.checked_add(*len).filter(|end| *end <= script.base_len);
                let Some(end) = end else {
                    return Err(DeltaError::CopyOutOfRange {
                        offset: *offset,
                        len: *len,
                        base_len: script.base_len,
                    });
                };
                out.extend_from_slice(&base[*offset as usize..end as usize]);
            }
            EditOp::Insert(bytes) => out.extend_from_slice(bytes),
        }
    }

    if out.len() as u64 != script.target_len {
        return Err(DeltaError::TargetMismatch {
            expected: script.target_len,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}
