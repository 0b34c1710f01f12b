//! Alternates file parsing and recursive loading.
//!
//! The file `objects/info/alternates` contains one path per line, each
//! pointing at another object directory. Each alternate is itself an
//! object store that may have its own alternates file (forming a chain).
//! Circular chains are detected and rejected. On Windows the entries may
//! carry drive letters, so the colon-separated form skips the first two
//! characters of each entry before splitting.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vergit_pack::cache::PackMemoryCache;

use crate::{ObjectDatabase, OdbError};

/// Maximum depth for recursive alternates loading (matches C git).
const MAX_ALTERNATES_DEPTH: usize = 5;

/// Load alternates for the given objects directory.
///
/// Returns a list of ObjectDatabase instances, one per alternate.
pub fn load_alternates(
    objects_dir: &Path,
    cache: &Arc<dyn PackMemoryCache>,
) -> Result<Vec<ObjectDatabase>, OdbError> {
    let mut visited = HashSet::new();
    let canonical = objects_dir
        .canonicalize()
        .unwrap_or_else(|_| objects_dir.to_path_buf());
    visited.insert(canonical);
    load_alternates_recursive(objects_dir, cache, &mut visited, 0)
}

/// Recursively load alternates, tracking visited paths to detect cycles.
fn load_alternates_recursive(
    objects_dir: &Path,
    cache: &Arc<dyn PackMemoryCache>,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<Vec<ObjectDatabase>, OdbError> {
    if depth >= MAX_ALTERNATES_DEPTH {
        return Err(OdbError::Alternates(format!(
            "alternates chain too deep (>{MAX_ALTERNATES_DEPTH} levels)"
        )));
    }

    let alternates_path = objects_dir.join("info").join("alternates");
    if !alternates_path.is_file() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&alternates_path).map_err(|e| {
        OdbError::Alternates(format!(
            "failed to read {}: {}",
            alternates_path.display(),
            e
        ))
    })?;

    let mut result = Vec::new();

    for entry in split_alternate_entries(&content) {
        // Resolve relative paths against the owning objects directory.
        let alt_path = if Path::new(&entry).is_absolute() {
            PathBuf::from(&entry)
        } else {
            objects_dir.join(&entry)
        };

        // Nonexistent alternates are skipped, like C git's warning path.
        if !alt_path.is_dir() {
            continue;
        }

        let canonical = alt_path
            .canonicalize()
            .unwrap_or_else(|_| alt_path.clone());
        if !visited.insert(canonical) {
            return Err(OdbError::CircularAlternates(alt_path));
        }

        let nested = load_alternates_recursive(&alt_path, cache, visited, depth + 1)?;

        result.push(ObjectDatabase {
            loose: vergit_loose::LooseObjectStore::open(&alt_path),
            packs: std::sync::OnceLock::new(),
            alternates: nested,
            cache: cache.clone(),
            objects_dir: alt_path,
        });
    }

    Ok(result)
}

/// Split alternates file content into entries.
///
/// Entries are newline-separated; a line may itself hold several paths
/// separated by `:` (`;` semantics with drive letters on Windows, where
/// the first two characters of each entry are skipped before looking for
/// the separator).
fn split_alternate_entries(content: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut rest = line;
        loop {
            // Skip a possible drive-letter prefix before searching for the
            // separator.
            let search_from = if cfg!(windows) && rest.len() > 2 { 2 } else { 0 };
            match rest[search_from..].find(':') {
                Some(pos) => {
                    let (head, tail) = rest.split_at(search_from + pos);
                    if !head.is_empty() {
                        entries.push(head.to_string());
                    }
                    rest = &tail[1..];
                }
                None => {
                    if !rest.is_empty() {
                        entries.push(rest.to_string());
                    }
                    break;
                }
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_single_entries() {
        let content = "# comment\n/a/objects\n\n../shared/objects\n";
        assert_eq!(
            split_alternate_entries(content),
            vec!["/a/objects", "../shared/objects"]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn split_colon_separated() {
        let content = "/a/objects:/b/objects\n";
        assert_eq!(
            split_alternate_entries(content),
            vec!["/a/objects", "/b/objects"]
        );
    }

    #[test]
    fn load_missing_alternates_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache: Arc<dyn PackMemoryCache> =
            Arc::new(vergit_pack::cache::PackCache::new());
        let alternates = load_alternates(dir.path(), &cache).unwrap();
        assert!(alternates.is_empty());
    }

    #[test]
    fn circular_alternates_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(a.join("info")).unwrap();
        fs::create_dir_all(b.join("info")).unwrap();
        fs::write(a.join("info/alternates"), format!("{}\n", b.display())).unwrap();
        fs::write(b.join("info/alternates"), format!("{}\n", a.display())).unwrap();

        let cache: Arc<dyn PackMemoryCache> =
            Arc::new(vergit_pack::cache::PackCache::new());
        let err = load_alternates(&a, &cache).unwrap_err();
        assert!(matches!(err, OdbError::CircularAlternates(_)));
    }
}
