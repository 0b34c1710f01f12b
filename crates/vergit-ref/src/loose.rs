use std::fs;
use std::path::Path;

use bstr::ByteSlice;
use vergit_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// Read a loose ref file and return the Reference.
///
/// A loose ref is a file under the ref directory (or `HEAD` itself)
/// containing either a hex OID or `ref: <target-ref>`.
pub(crate) fn read_loose_ref(
    ref_dir: &Path,
    name: &RefName,
) -> Result<Option<Reference>, RefError> {
    let path = ref_dir.join(name.as_str());
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read(&path).map_err(|e| RefError::IoPath {
        path: path.clone(),
        source: e,
    })?;

    parse_ref_content(&contents, name)
        .map(Some)
        .map_err(|e| match e {
            RefError::Parse(reason) => {
                RefError::Parse(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
}

/// Parse ref file content: `ref: <name>` or a 40-hex OID.
pub(crate) fn parse_ref_content(
    contents: &[u8],
    name: &RefName,
) -> Result<Reference, RefError> {
    let trimmed = contents.trim();

    if let Some(target_bytes) = trimmed.strip_prefix(b"ref: ") {
        let target_str = std::str::from_utf8(target_bytes.trim())
            .map_err(|_| RefError::Parse("invalid UTF-8 in symbolic ref target".into()))?;
        let target = RefName::new(target_str)?;
        Ok(Reference::Symbolic {
            name: name.clone(),
            target,
        })
    } else {
        let hex = std::str::from_utf8(trimmed)
            .map_err(|_| RefError::Parse("invalid UTF-8 in ref OID".into()))?;
        let oid = ObjectId::from_hex(hex)
            .map_err(|e| RefError::Parse(format!("bad ref OID: {e}")))?;
        Ok(Reference::Direct {
            name: name.clone(),
            target: oid,
        })
    }
}
