//! Unified read-only object database.
//!
//! A single interface to read objects across loose storage, packfiles,
//! and alternate object databases. Packs are searched first (matching
//! C git: a packed copy is authoritative and lets packed delta bases be
//! found before their loose duplicates), then the loose store, then each
//! alternate in order.

pub mod alternates;
mod prefix;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use vergit_hash::ObjectId;
use vergit_loose::{LooseObjectStore, LooseObjectStream};
use vergit_object::ObjectType;
use vergit_pack::cache::{NullCache, PackCache, PackMemoryCache, ViewStream};
use vergit_pack::pack::{PackFile, PackObjectStream};

/// Errors produced by object database operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("alternates error: {0}")]
    Alternates(String),

    #[error("circular alternates chain detected at {0}")]
    CircularAlternates(PathBuf),

    #[error(transparent)]
    Loose(#[from] vergit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] vergit_pack::PackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lightweight object info (header only, no content).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: u64,
}

/// A readable object, from whichever store held it.
pub enum ObjectStream {
    Packed(PackObjectStream),
    Loose(LooseObjectStream),
}

impl ObjectStream {
    /// The object's type.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Packed(s) => s.object_type(),
            Self::Loose(s) => s.object_type(),
        }
    }

    /// The uncompressed object length.
    pub fn len(&self) -> u64 {
        match self {
            Self::Packed(s) => s.len(),
            Self::Loose(s) => s.size() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the stream into a byte vector.
    pub fn into_vec(mut self) -> Result<Vec<u8>, OdbError> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Packed(s) => s.read(buf),
            Self::Loose(s) => s.read(buf),
        }
    }
}

/// Unified object database over one objects directory and its alternates.
pub struct ObjectDatabase {
    /// Loose object store.
    loose: LooseObjectStore,
    /// Pack files. Discovered on the first lookup, then fixed in that
    /// order for the lifetime of the handle.
    packs: OnceLock<Vec<PackFile>>,
    /// Alternate object databases.
    alternates: Vec<ObjectDatabase>,
    /// Pack memory cache shared by every pack of this database.
    cache: Arc<dyn PackMemoryCache>,
    /// Path to the objects directory.
    objects_dir: PathBuf,
}

impl std::fmt::Debug for ObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDatabase")
            .field("objects_dir", &self.objects_dir)
            .finish()
    }
}

impl ObjectDatabase {
    /// Open the object database at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_cache(objects_dir, Arc::new(PackCache::new()))
    }

    /// Open without retaining reconstructed objects in memory.
    pub fn open_uncached(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_cache(objects_dir, Arc::new(NullCache))
    }

    /// Open with an explicit pack memory cache.
    pub fn open_with_cache(
        objects_dir: impl AsRef<Path>,
        cache: Arc<dyn PackMemoryCache>,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let loose = LooseObjectStore::open(&objects_dir);
        let alternates = alternates::load_alternates(&objects_dir, &cache)?;

        Ok(Self {
            loose,
            packs: OnceLock::new(),
            alternates,
            cache,
            objects_dir,
        })
    }

    /// Read an object by OID as a stream (packs → loose → alternates).
    ///
    /// `expected` is enforced by whichever store finds the object; only
    /// absence becomes `Ok(None)`.
    pub fn try_get(
        &self,
        oid: &ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<ObjectStream>, OdbError> {
        // 1. Packs win over loose copies.
        if let Some(stream) = self.read_from_packs(oid, expected)? {
            return Ok(Some(ObjectStream::Packed(stream)));
        }

        // 2. Loose store.
        if let Some(stream) = self.loose.stream(oid, expected)? {
            return Ok(Some(ObjectStream::Loose(stream)));
        }

        // 3. Alternates, in listed order.
        for alt in &self.alternates {
            if let Some(stream) = alt.try_get(oid, expected)? {
                return Ok(Some(stream));
            }
        }

        Ok(None)
    }

    /// Read just the header (type + size) without reconstructing content.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        let base_type = |base: &ObjectId| -> Option<ObjectType> {
            self.read_header(base).ok().flatten().map(|info| info.obj_type)
        };
        for pack in self.packs()? {
            if let Some((obj_type, size)) = pack.read_header(oid, &base_type)? {
                return Ok(Some(ObjectInfo { obj_type, size }));
            }
        }

        if let Some((obj_type, size)) = self.loose.read_header(oid)? {
            return Ok(Some(ObjectInfo {
                obj_type,
                size: size as u64,
            }));
        }

        for alt in &self.alternates {
            if let Some(info) = alt.read_header(oid)? {
                return Ok(Some(info));
            }
        }

        Ok(None)
    }

    /// Check if an object exists (index lookups only, no decompression).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        let in_packs = self
            .packs()
            .map(|packs| packs.iter().any(|p| p.contains(oid)))
            .unwrap_or(false);
        in_packs
            || self.loose.contains(oid)
            || self.alternates.iter().any(|alt| alt.contains(oid))
    }

    /// Resolve a hex prefix (1..=40 chars) to a unique object id.
    ///
    /// Both "nothing matched" and "more than one match" come back as
    /// `None`; callers cannot tell them apart, matching git's behavior.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<Option<ObjectId>, OdbError> {
        prefix::resolve_prefix(self, prefix)
    }

    /// All object ids matching a hex prefix, across every store.
    pub fn prefix_matches(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        prefix::prefix_matches(self, prefix)
    }

    /// Get the path to the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Alternate object databases, in listed order.
    pub fn alternates(&self) -> &[ObjectDatabase] {
        &self.alternates
    }

    /// The loose object store.
    pub fn loose(&self) -> &LooseObjectStore {
        &self.loose
    }

    /// The pack list, discovered on first use.
    pub(crate) fn packs(&self) -> Result<&[PackFile], OdbError> {
        if let Some(packs) = self.packs.get() {
            return Ok(packs);
        }
        let discovered = discover_packs(&self.objects_dir, &self.cache)?;
        // If another thread initialized concurrently, its list wins.
        Ok(self.packs.get_or_init(|| discovered))
    }

    /// Probe every pack for `oid`, resolving cross-pack REF_DELTA bases
    /// through the other packs, the loose store, and the alternates.
    fn read_from_packs(
        &self,
        oid: &ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<PackObjectStream>, OdbError> {
        let packs = self.packs()?;
        for pack in packs {
            let resolver = |base: &ObjectId,
                            base_expected: Option<ObjectType>|
             -> Option<(ObjectType, ViewStream)> {
                // Other packs first (no nested external resolution).
                for other in packs {
                    if std::ptr::eq(other, pack) {
                        continue;
                    }
                    if let Ok(Some(stream)) = other.read_stream(
                        base,
                        base_expected,
                        &vergit_pack::pack::no_external_bases,
                    ) {
                        return Some((stream.object_type(), stream.into_view()));
                    }
                }
                // Loose store.
                if let Ok(Some(stream)) = self.loose.stream(base, base_expected) {
                    let obj_type = stream.object_type();
                    let len = stream.size() as u64;
                    return Some((obj_type, ViewStream::detached(len, Box::new(stream))));
                }
                // Alternates.
                for alt in &self.alternates {
                    if let Ok(Some(stream)) = alt.try_get(base, base_expected) {
                        let obj_type = stream.object_type();
                        let len = stream.len();
                        return Some((obj_type, ViewStream::detached(len, Box::new(stream))));
                    }
                }
                None
            };

            if let Some(stream) = pack.read_stream(oid, expected, &resolver)? {
                return Ok(Some(stream));
            }
        }
        Ok(None)
    }
}

/// Discover pack files in the objects/pack directory.
///
/// Sorted by modification time, newest first; that order is fixed for the
/// lifetime of the handle.
fn discover_packs(
    objects_dir: &Path,
    cache: &Arc<dyn PackMemoryCache>,
) -> Result<Vec<PackFile>, OdbError> {
    let pack_dir = objects_dir.join("pack");
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(&pack_dir)?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    let mut packs = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pack") {
            match PackFile::open(&path, cache.clone()) {
                Ok(pack) => packs.push(pack),
                Err(_) => {
                    // Skip unreadable packs; other stores may still have
                    // the objects.
                    continue;
                }
            }
        }
    }

    Ok(packs)
}
