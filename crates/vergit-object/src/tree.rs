use std::io::BufRead;

use bstr::BString;
use vergit_hash::ObjectId;

use crate::ObjectError;

/// A single entry in a git tree object.
///
/// The on-disk mode is collapsed to a file/directory flag: entries whose
/// mode starts with ASCII `'1'` ("100644", "100755", "120000", "160000")
/// are files, everything else ("40000") is a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: BString,
    pub is_file: bool,
    pub id: ObjectId,
}

/// A git tree object — a directory listing, sorted by name bytes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub id: ObjectId,
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Parse tree content from its binary format.
    ///
    /// Each entry is: `<mode-ascii> <name>\0<20-byte-oid>`
    pub fn parse(id: ObjectId, content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode = &content[pos..space_pos];
            if mode.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "empty mode".into(),
                });
            }
            let is_file = mode[0] == b'1';

            let null_pos = content[space_pos + 1..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: space_pos + 1,
                    reason: "missing null after name".into(),
                })?
                + space_pos
                + 1;

            let name = BString::from(&content[space_pos + 1..null_pos]);
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: space_pos + 1,
                    reason: "empty name".into(),
                });
            }

            let id_start = null_pos + 1;
            let id_end = id_start + 20;
            if id_end > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: id_start,
                    reason: "truncated OID".into(),
                });
            }
            let child = ObjectId::from_bytes(&content[id_start..id_end])?;

            entries.push(TreeEntry {
                name,
                is_file,
                id: child,
            });
            pos = id_end;
        }

        Ok(Self { id, entries })
    }

    /// Find an entry by name. Comparison is byte-exact unless `ignore_case`
    /// asks for an ASCII A–Z fold.
    pub fn entry(&self, name: &[u8], ignore_case: bool) -> Option<&TreeEntry> {
        self.entries
            .iter()
            .find(|e| names_equal(e.name.as_slice(), name, ignore_case))
    }
}

/// Scan tree bytes from `reader` for a single named entry.
///
/// Stops at the first match without materializing the rest of the tree;
/// a tree whose wanted entry comes early never gets fully decompressed.
pub fn find_entry<R: BufRead>(
    mut reader: R,
    name: &[u8],
    ignore_case: bool,
) -> Result<Option<ObjectId>, ObjectError> {
    let mut offset = 0usize;
    let mut mode = Vec::with_capacity(8);
    let mut entry_name = Vec::with_capacity(64);

    loop {
        mode.clear();
        let n = reader.read_until(b' ', &mut mode)?;
        if n == 0 {
            return Ok(None);
        }
        if mode.last() != Some(&b' ') || mode.len() < 2 {
            return Err(ObjectError::InvalidTreeEntry {
                offset,
                reason: "truncated mode".into(),
            });
        }
        offset += n;

        entry_name.clear();
        let n = reader.read_until(0, &mut entry_name)?;
        if entry_name.pop() != Some(0) {
            return Err(ObjectError::InvalidTreeEntry {
                offset,
                reason: "missing null after name".into(),
            });
        }
        offset += n;

        let mut id_bytes = [0u8; 20];
        reader.read_exact(&mut id_bytes).map_err(|_| {
            ObjectError::InvalidTreeEntry {
                offset,
                reason: "truncated OID".into(),
            }
        })?;
        offset += 20;

        if names_equal(&entry_name, name, ignore_case) {
            return Ok(Some(ObjectId::from_bytes(&id_bytes)?));
        }
    }
}

fn names_equal(a: &[u8], b: &[u8], ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
