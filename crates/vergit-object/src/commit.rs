use bstr::BStr;
use vergit_hash::ObjectId;
use vergit_utils::date::Signature;

use crate::ObjectError;

/// A git commit, reduced to the fields history walks need.
///
/// Parents are stored split: one and two parents cover almost every commit,
/// so the third-and-beyond list of an octopus merge is kept separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The commit's own OID.
    pub id: ObjectId,
    /// OID of the root tree.
    pub tree: ObjectId,
    /// First parent (None for root commits).
    pub first_parent: Option<ObjectId>,
    /// Second parent (merge commits).
    pub second_parent: Option<ObjectId>,
    /// Third and later parents (octopus merges).
    pub additional_parents: Vec<ObjectId>,
    /// Author identity and timestamp, populated only when requested.
    pub author: Option<Signature>,
}

impl Commit {
    /// Parse commit content from raw bytes (no object header).
    ///
    /// A missing `tree` line is fatal. The author line is only parsed when
    /// `read_author` is set; a malformed author line is fatal then, ignored
    /// otherwise. Committer, gpgsig, and the message are skipped entirely.
    pub fn parse(id: ObjectId, content: &[u8], read_author: bool) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut first_parent: Option<ObjectId> = None;
        let mut second_parent: Option<ObjectId> = None;
        let mut additional_parents = Vec::new();
        let mut author: Option<Signature> = None;

        let mut pos = 0;
        let data = content;

        // Headers end at the blank line before the message.
        while pos < data.len() && data[pos] != b'\n' {
            let line_end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());

            let line = &data[pos..line_end];

            if let Some(space_pos) = line.iter().position(|&b| b == b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];

                match key {
                    b"tree" => {
                        let hex = std::str::from_utf8(value)
                            .map_err(|_| ObjectError::InvalidHeader("non-UTF8 tree OID".into()))?;
                        tree = Some(ObjectId::from_hex(hex)?);
                    }
                    b"parent" => {
                        let hex = std::str::from_utf8(value)
                            .map_err(|_| ObjectError::InvalidHeader("non-UTF8 parent OID".into()))?;
                        let parent = ObjectId::from_hex(hex)?;
                        if first_parent.is_none() {
                            first_parent = Some(parent);
                        } else if second_parent.is_none() {
                            second_parent = Some(parent);
                        } else {
                            additional_parents.push(parent);
                        }
                    }
                    b"author" if read_author => {
                        author = Some(Signature::parse(BStr::new(value)).map_err(|e| {
                            ObjectError::InvalidSignature {
                                oid: id,
                                reason: e.to_string(),
                            }
                        })?);
                    }
                    _ => {
                        // committer, gpgsig, and friends are not needed here.
                    }
                }
            }

            pos = line_end + 1;
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { oid: id, field: "tree" })?;

        Ok(Self {
            id,
            tree,
            first_parent,
            second_parent,
            additional_parents,
            author,
        })
    }

    /// Iterate over all parents in declaration order.
    pub fn parents(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.first_parent
            .into_iter()
            .chain(self.second_parent)
            .chain(self.additional_parents.iter().copied())
    }

    /// Is this a merge commit? (more than one parent)
    pub fn is_merge(&self) -> bool {
        self.second_parent.is_some()
    }

    /// Is this a root commit? (no parents)
    pub fn is_root(&self) -> bool {
        self.first_parent.is_none()
    }
}
