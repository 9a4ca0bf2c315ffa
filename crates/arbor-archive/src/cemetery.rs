//! Naming of deleted archives.
//!
//! A deleted file's archive is parked under a name derived only from its
//! file id, so the name can be turned back into the id without any lookup.

use arbor_types::FileId;

const PREFIX: &str = "deleted-";
const SUFFIX: &str = ".arbor";

/// Cemetery name of the archive for `file_id`.
pub fn cemetery_name(file_id: FileId) -> String {
    format!("{PREFIX}{:010}{SUFFIX}", file_id.get())
}

/// Inverse of [`cemetery_name`]. Only canonical names parse.
pub fn parse_cemetery_name(name: &str) -> Option<FileId> {
    let digits = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = FileId::new(digits.parse().ok()?);
    (cemetery_name(id) == name).then_some(id)
}
