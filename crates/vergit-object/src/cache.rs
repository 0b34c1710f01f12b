//! LRU cache for parsed commits.

use std::num::NonZeroUsize;

use lru::LruCache;
use vergit_hash::ObjectId;

use crate::Commit;

/// LRU cache for parsed commits.
///
/// Keyed by `(oid, with_author)` because a commit parsed without its author
/// cannot satisfy a later request that needs one.
pub struct CommitCache {
    cache: LruCache<(ObjectId, bool), Commit>,
}

impl CommitCache {
    /// Create with the given capacity (number of commits).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached commit (promotes it to most-recently-used).
    pub fn get(&mut self, oid: &ObjectId, with_author: bool) -> Option<&Commit> {
        self.cache.get(&(*oid, with_author))
    }

    /// Insert a commit into the cache.
    pub fn insert(&mut self, oid: ObjectId, with_author: bool, commit: Commit) {
        self.cache.push((oid, with_author), commit);
    }

    /// Clear all cached commits.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Current number of cached commits.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
