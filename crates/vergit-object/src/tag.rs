use bstr::BString;
use vergit_hash::ObjectId;

use crate::{ObjectError, ObjectType};

/// A git annotated tag, reduced to the headers tag resolution needs.
///
/// `target_type` may itself be `Tag` (nested tags); callers peel those
/// transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The tag object's own OID.
    pub id: ObjectId,
    /// OID of the tagged object.
    pub target: ObjectId,
    /// Type of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub tag_name: BString,
}

impl Tag {
    /// Parse tag content from raw bytes (no object header).
    ///
    /// Only the `object`, `type`, and `tag` headers are read; tagger,
    /// message, and signatures are skipped.
    pub fn parse(id: ObjectId, content: &[u8]) -> Result<Self, ObjectError> {
        let mut target: Option<ObjectId> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut tag_name: Option<BString> = None;

        let mut pos = 0;
        let data = content;

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
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF8 target OID".into())
                        })?;
                        target = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => {
                        target_type = Some(ObjectType::from_bytes(value)?);
                    }
                    b"tag" => {
                        tag_name = Some(BString::from(value));
                    }
                    _ => {
                        // tagger and everything after it is irrelevant here.
                    }
                }
            }

            pos = line_end + 1;
        }

        let target = target.ok_or(ObjectError::MissingTagField { oid: id, field: "object" })?;
        let target_type =
            target_type.ok_or(ObjectError::MissingTagField { oid: id, field: "type" })?;
        let tag_name = tag_name.ok_or(ObjectError::MissingTagField { oid: id, field: "tag" })?;

        Ok(Self {
            id,
            target,
            target_type,
            tag_name,
        })
    }
}
