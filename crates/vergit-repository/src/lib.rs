//! Repository discovery and the read-only lookup surface.
//!
//! A [`Repository`] ties the ref store and the object database together:
//! it resolves refs and abbreviated ids to object ids and hands back
//! parsed commits, trees, and tag relationships. Nothing here writes to
//! the repository.

mod discover;
mod error;

pub use error::RepoError;

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use vergit_hash::ObjectId;
use vergit_object::cache::CommitCache;
use vergit_object::{find_entry, Commit, ObjectType, Tag, Tree};
use vergit_odb::{ObjectDatabase, ObjectStream, OdbError};
use vergit_ref::{RefStore, Reference};

/// Depth bound when following nested annotated tags.
const MAX_TAG_DEPTH: usize = 10;

/// How many parsed commits to keep around; history walks revisit commits
/// constantly.
const COMMIT_CACHE_SIZE: usize = 1024;

/// A read-only handle on a git repository.
pub struct Repository {
    /// Working directory (None for bare repositories).
    work_dir: Option<PathBuf>,
    /// Directory holding HEAD.
    git_dir: PathBuf,
    /// Shared directory (same as `git_dir` outside linked worktrees).
    common_dir: PathBuf,
    /// Object database (loose + packs + alternates).
    odb: ObjectDatabase,
    /// Ref store (loose refs + packed-refs).
    refs: RefStore,
    /// Parsed-commit cache.
    commits: Mutex<CommitCache>,
}

impl Repository {
    /// Open the repository containing `path`, walking up through parents.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let discovered = discover::discover(path.as_ref())?;
        let objects_dir = discovered.common_dir.join("objects");
        Self::from_parts(discovered, ObjectDatabase::open(objects_dir)?)
    }

    /// Open with an explicit objects directory instead of the derived
    /// `<common_dir>/objects`.
    pub fn open_with_objects_dir(
        path: impl AsRef<Path>,
        objects_dir: impl AsRef<Path>,
    ) -> Result<Self, RepoError> {
        let discovered = discover::discover(path.as_ref())?;
        Self::from_parts(discovered, ObjectDatabase::open(objects_dir.as_ref())?)
    }

    /// Open without the pack memory cache (deltas re-decompress per read).
    pub fn open_uncached(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let discovered = discover::discover(path.as_ref())?;
        let objects_dir = discovered.common_dir.join("objects");
        Self::from_parts(discovered, ObjectDatabase::open_uncached(objects_dir)?)
    }

    fn from_parts(
        discovered: discover::DiscoveredRepo,
        odb: ObjectDatabase,
    ) -> Result<Self, RepoError> {
        let refs = RefStore::new(&discovered.git_dir, &discovered.common_dir);
        Ok(Self {
            work_dir: discovered.work_dir,
            git_dir: discovered.git_dir,
            common_dir: discovered.common_dir,
            odb,
            refs,
            commits: Mutex::new(CommitCache::new(COMMIT_CACHE_SIZE)),
        })
    }

    // --- Path and subsystem accessors ---

    /// The working directory (None for bare repositories).
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// The directory holding HEAD.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The shared directory (refs, objects, packed-refs).
    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// The object database.
    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    /// The ref store.
    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    // --- Ref-level operations ---

    /// What HEAD points at: a ref name, or an object id when detached.
    pub fn head_ref_or_id(&self) -> Result<Reference, RepoError> {
        Ok(self.refs.head()?)
    }

    /// Resolve HEAD to a commit id (None on an unborn branch).
    pub fn head_commit_id(&self) -> Result<Option<ObjectId>, RepoError> {
        match self.refs.head()? {
            Reference::Direct { target, .. } => Ok(Some(target)),
            Reference::Symbolic { target, .. } => Ok(self.refs.resolve_ref(&target, 0)?),
        }
    }

    /// Resolve a ref name or (possibly abbreviated) object id.
    ///
    /// Refs win over hex-looking names, matching git. An ambiguous
    /// abbreviation resolves to `None`, indistinguishable from absence.
    pub fn lookup(&self, spec: &str) -> Result<Option<ObjectId>, RepoError> {
        if spec.is_empty() {
            return Ok(None);
        }

        if let Some(oid) = self.refs.resolve_name(spec)? {
            return Ok(Some(oid));
        }

        if spec.len() <= 40 && spec.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(self.odb.resolve_prefix(spec)?);
        }

        Ok(None)
    }

    // --- Object-level operations ---

    /// Raw object access. Absence and a type mismatch both come back as
    /// `None`; corruption stays an error.
    pub fn try_get_object(
        &self,
        oid: &ObjectId,
        expected: ObjectType,
    ) -> Result<Option<ObjectStream>, RepoError> {
        match self.odb.try_get(oid, Some(expected)) {
            Ok(stream) => Ok(stream),
            Err(e) if is_type_mismatch(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and parse a commit. Author parsing is opt-in; commits parsed
    /// either way are memoized.
    pub fn get_commit(&self, oid: &ObjectId, read_author: bool) -> Result<Commit, RepoError> {
        if let Some(commit) = self.commits.lock().unwrap().get(oid, read_author) {
            return Ok(commit.clone());
        }

        let stream = self
            .try_get_object(oid, ObjectType::Commit)?
            .ok_or(RepoError::MissingObject(*oid))?;
        let bytes = stream.into_vec()?;
        let commit = Commit::parse(*oid, &bytes, read_author)?;

        self.commits
            .lock()
            .unwrap()
            .insert(*oid, read_author, commit.clone());
        Ok(commit)
    }

    /// Read and parse a whole tree.
    pub fn get_tree(&self, oid: &ObjectId) -> Result<Tree, RepoError> {
        let stream = self
            .try_get_object(oid, ObjectType::Tree)?
            .ok_or(RepoError::MissingObject(*oid))?;
        let bytes = stream.into_vec()?;
        Ok(Tree::parse(*oid, &bytes)?)
    }

    /// Find one named entry in a tree without materializing the tree.
    ///
    /// Name comparison is byte-exact unless `ignore_case` asks for an
    /// ASCII fold (for repositories on case-insensitive filesystems).
    pub fn get_tree_entry(
        &self,
        tree_oid: &ObjectId,
        name: &[u8],
        ignore_case: bool,
    ) -> Result<Option<ObjectId>, RepoError> {
        let stream = self
            .try_get_object(tree_oid, ObjectType::Tree)?
            .ok_or(RepoError::MissingObject(*tree_oid))?;
        Ok(find_entry(BufReader::new(stream), name, ignore_case)?)
    }

    /// Read and parse an annotated tag object.
    pub fn get_tag(&self, oid: &ObjectId) -> Result<Tag, RepoError> {
        let stream = self
            .try_get_object(oid, ObjectType::Tag)?
            .ok_or(RepoError::MissingObject(*oid))?;
        let bytes = stream.into_vec()?;
        Ok(Tag::parse(*oid, &bytes)?)
    }

    /// Follow nested annotated tags until a non-tag object id.
    pub fn peel_to_commit(&self, oid: &ObjectId) -> Result<ObjectId, RepoError> {
        let mut current = *oid;
        for _ in 0..MAX_TAG_DEPTH {
            match self.try_get_object(&current, ObjectType::Tag)? {
                Some(stream) => {
                    let bytes = stream.into_vec()?;
                    current = Tag::parse(current, &bytes)?.target;
                }
                None => return Ok(current),
            }
        }
        Err(RepoError::TagChainTooDeep(*oid))
    }

    /// Canonical names of all tags pointing at `target`.
    ///
    /// Lightweight tags match by ref value; annotated tags by their peeled
    /// target. Packed records without a peel line peel to themselves (the
    /// tag object id), so such a tag does not match its commit — inherited
    /// behavior that callers depend on.
    pub fn lookup_tags(&self, target: &ObjectId) -> Result<Vec<String>, RepoError> {
        let mut names = Vec::new();
        for tag_ref in self.refs.iter_tag_refs()? {
            let matched = if tag_ref.target == *target {
                true
            } else if let Some(peeled) = tag_ref.peeled {
                peeled == *target
            } else {
                self.tag_peels_to(tag_ref.target, target)?
            };
            if matched {
                names.push(tag_ref.name.as_str().to_string());
            }
        }
        Ok(names)
    }

    /// The shortest hex prefix of `oid`, at least `min_len` chars, that is
    /// unique across all stores.
    pub fn short_id(&self, oid: &ObjectId, min_len: usize) -> Result<String, RepoError> {
        let hex = oid.to_hex();
        let min_len = min_len.clamp(1, 40);
        for len in min_len..40 {
            let matches = self.odb.prefix_matches(&hex[..len])?;
            if matches == [*oid] {
                return Ok(hex[..len].to_string());
            }
        }
        Ok(hex)
    }

    /// Does the (possibly nested) annotated tag at `tag_oid` peel to
    /// `target`?
    fn tag_peels_to(&self, tag_oid: ObjectId, target: &ObjectId) -> Result<bool, RepoError> {
        let mut current = tag_oid;
        for _ in 0..MAX_TAG_DEPTH {
            match self.try_get_object(&current, ObjectType::Tag)? {
                Some(stream) => {
                    let bytes = stream.into_vec()?;
                    let tag = Tag::parse(current, &bytes)?;
                    if tag.target == *target {
                        return Ok(true);
                    }
                    if tag.target_type == ObjectType::Tag {
                        current = tag.target;
                        continue;
                    }
                    return Ok(false);
                }
                None => return Ok(false),
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("git_dir", &self.git_dir)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

fn is_type_mismatch(e: &OdbError) -> bool {
    matches!(
        e,
        OdbError::Pack(vergit_pack::PackError::TypeMismatch { .. })
            | OdbError::Loose(vergit_loose::LooseError::TypeMismatch { .. })
    )
}
