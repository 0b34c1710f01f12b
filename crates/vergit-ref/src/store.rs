use std::fs;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use vergit_hash::ObjectId;

use crate::error::RefError;
use crate::loose::read_loose_ref;
use crate::name::RefName;
use crate::packed::PackedRefs;
use crate::Reference;

/// Maximum depth for following symbolic ref chains.
const MAX_SYMREF_DEPTH: usize = 10;

/// A tag ref surfaced by [`RefStore::iter_tag_refs`].
#[derive(Debug, Clone)]
pub struct TagRef {
    pub name: RefName,
    /// What the ref itself points at (a commit, or a tag object for
    /// annotated tags).
    pub target: ObjectId,
    /// The peeled target for packed records. A packed tag record without a
    /// peel line peels to itself — the tag object id, not the commit; that
    /// quirk is inherited and callers rely on it. `None` means the entry
    /// came from a loose file and must be peeled by reading objects.
    pub peeled: Option<ObjectId>,
}

/// Read-only ref store over loose refs and packed-refs.
///
/// HEAD lives in the worktree's own git dir; everything else is shared
/// through the common dir.
pub struct RefStore {
    git_dir: PathBuf,
    common_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl AsRef<Path>, common_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
            common_dir: common_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// Read HEAD: either a detached object id or a symbolic ref.
    ///
    /// Detached form is exactly 40 hex chars (plus newline); anything else
    /// must start with `ref: `.
    pub fn head(&self) -> Result<Reference, RefError> {
        let path = self.git_dir.join("HEAD");
        let contents = fs::read(&path).map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?;
        let trimmed = contents.trim();

        if let Some(target) = trimmed.strip_prefix(b"ref: ") {
            let target_str = std::str::from_utf8(target.trim())
                .map_err(|_| RefError::MalformedHead("non-UTF8 ref target".into()))?;
            return Ok(Reference::Symbolic {
                name: RefName::new_unchecked("HEAD"),
                target: RefName::new(target_str)?,
            });
        }

        if trimmed.len() == 40 {
            if let Ok(hex) = std::str::from_utf8(trimmed) {
                if let Ok(oid) = ObjectId::from_hex(hex) {
                    return Ok(Reference::Direct {
                        name: RefName::new_unchecked("HEAD"),
                        target: oid,
                    });
                }
            }
        }

        Err(RefError::MalformedHead(
            String::from_utf8_lossy(trimmed).into_owned(),
        ))
    }

    /// Resolve a ref name (possibly abbreviated) to an object id.
    ///
    /// Tries, in order: the literal file under the common dir, then — for
    /// non-canonical names — `refs/heads/`, `refs/tags/`, `refs/remotes/`
    /// prefixes, each falling back to packed-refs. Symbolic chains are
    /// followed. `HEAD` resolves through the git dir.
    pub fn resolve_name(&self, name: &str) -> Result<Option<ObjectId>, RefError> {
        let Ok(ref_name) = RefName::new(name) else {
            return Ok(None);
        };

        let mut candidates = vec![ref_name.clone()];
        if !ref_name.is_canonical() {
            for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/"] {
                candidates.push(RefName::new_unchecked(format!("{prefix}{name}")));
            }
        }

        for candidate in &candidates {
            if let Some(oid) = self.resolve_ref(candidate, 0)? {
                return Ok(Some(oid));
            }
        }
        Ok(None)
    }

    /// Resolve one exact ref name, following symbolic chains.
    pub fn resolve_ref(&self, name: &RefName, depth: usize) -> Result<Option<ObjectId>, RefError> {
        if depth > MAX_SYMREF_DEPTH {
            return Err(RefError::SymrefLoop(name.to_string()));
        }

        // HEAD is per-worktree; shared refs live under the common dir.
        let ref_dir = if name.as_str() == "HEAD" {
            &self.git_dir
        } else {
            &self.common_dir
        };

        match read_loose_ref(ref_dir, name)? {
            Some(Reference::Direct { target, .. }) => Ok(Some(target)),
            Some(Reference::Symbolic { target, .. }) => self.resolve_ref(&target, depth + 1),
            None => {
                let packed = PackedRefs::load(&self.common_dir)?;
                Ok(packed.find(name).map(|pr| pr.oid))
            }
        }
    }

    /// Enumerate every `refs/tags/*` entry: loose files first, then packed
    /// records not shadowed by a loose file.
    pub fn iter_tag_refs(&self) -> Result<Vec<TagRef>, RefError> {
        let mut tags: Vec<TagRef> = Vec::new();

        let tags_dir = self.common_dir.join("refs").join("tags");
        collect_loose_tags(&tags_dir, "refs/tags", &mut tags)?;

        let loose_names: Vec<RefName> = tags.iter().map(|t| t.name.clone()).collect();

        let packed = PackedRefs::load(&self.common_dir)?;
        for pr in packed.refs() {
            if !pr.name.is_tag() || loose_names.contains(&pr.name) {
                continue;
            }
            tags.push(TagRef {
                name: pr.name.clone(),
                target: pr.oid,
                // No peel line means the record peels to itself.
                peeled: Some(pr.peeled.unwrap_or(pr.oid)),
            });
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

/// Recursively collect loose tag refs under `dir`.
fn collect_loose_tags(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<TagRef>,
) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RefError::Io(e)),
    };

    for entry in entries {
        let entry = entry.map_err(RefError::Io)?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let full_name = format!("{prefix}/{file_name}");

        let file_type = entry.file_type().map_err(RefError::Io)?;
        if file_type.is_dir() {
            collect_loose_tags(&entry.path(), &full_name, out)?;
            continue;
        }

        let Ok(name) = RefName::new(full_name) else {
            continue;
        };
        let contents = fs::read(entry.path()).map_err(RefError::Io)?;
        match crate::loose::parse_ref_content(&contents, &name) {
            Ok(Reference::Direct { target, .. }) => out.push(TagRef {
                name,
                target,
                peeled: None,
            }),
            // Symbolic tags and unreadable entries are skipped; tag
            // enumeration is best-effort.
            _ => continue,
        }
    }
    Ok(())
}
