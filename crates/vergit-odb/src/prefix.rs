//! OID prefix resolution (short hex → full OID with ambiguity detection).

use vergit_hash::hex::hex_prefix_to_bytes;
use vergit_hash::ObjectId;

use crate::{ObjectDatabase, OdbError};

/// Resolve a hex prefix to a full OID.
///
/// Exactly one distinct match across loose objects, pack files, and
/// alternates resolves; zero or several come back as `None`.
pub(crate) fn resolve_prefix(
    odb: &ObjectDatabase,
    prefix: &str,
) -> Result<Option<ObjectId>, OdbError> {
    let mut matches = prefix_matches(odb, prefix)?;
    matches.sort();
    matches.dedup();
    match matches.len() {
        1 => Ok(Some(matches[0])),
        _ => Ok(None),
    }
}

/// Collect every object id matching `prefix` across all stores.
pub(crate) fn prefix_matches(
    odb: &ObjectDatabase,
    prefix: &str,
) -> Result<Vec<ObjectId>, OdbError> {
    if prefix.is_empty() || prefix.len() > 40 {
        return Ok(Vec::new());
    }

    // A full id needs no scan, just an existence check.
    if prefix.len() == 40 {
        return match ObjectId::from_hex(prefix) {
            Ok(oid) if odb.contains(&oid) => Ok(vec![oid]),
            _ => Ok(Vec::new()),
        };
    }

    let Some((prefix_bytes, half_byte)) = hex_prefix_to_bytes(prefix) else {
        return Ok(Vec::new());
    };

    let mut matches: Vec<ObjectId> = Vec::new();

    // 1. Pack indexes answer any prefix length.
    for pack in odb.packs()? {
        for (oid, _offset) in pack.index().lookup_prefix(&prefix_bytes, half_byte)? {
            matches.push(oid);
        }
    }

    // 2. The loose fan-out directory needs at least the two digits of its
    //    name plus one to filter on.
    if prefix.len() > 2 {
        matches.extend(odb.loose().prefix_matches(prefix)?);
    }

    // 3. Alternates.
    for alt in odb.alternates() {
        matches.extend(prefix_matches(alt, prefix)?);
    }

    // The same object may exist in several stores.
    matches.sort();
    matches.dedup();
    Ok(matches)
}
