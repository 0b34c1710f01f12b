//! PackFile: reading .pack files.
//!
//! A pack file contains a header, a sequence of compressed objects
//! (possibly deltified), and a trailing checksum (not verified here).
//! Objects come back as seekable streams; delta chains are reconstructed
//! lazily through the pack memory cache.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::read::ZlibDecoder;
use vergit_hash::ObjectId;
use vergit_object::ObjectType;

use crate::cache::{PackMemoryCache, ViewStream};
use crate::delta::stream::DeltaStream;
use crate::delta::read_size;
use crate::entry::{parse_entry_header, PackEntry};
use crate::index::PackIndex;
use crate::mapfile::{FileCursor, RandomAccessFile};
use crate::{
    PackEntryType, PackError, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE, PACK_SIGNATURE,
    PACK_VERSION,
};

/// Resolver for REF_DELTA bases that live outside this pack.
///
/// Supplied by the owning repository: given the base id and the expected
/// logical type, return the base's actual type and a seekable stream over
/// its bytes, or `None` if no other store has it.
pub type ExternalBaseFn<'a> =
    &'a dyn Fn(&ObjectId, Option<ObjectType>) -> Option<(ObjectType, ViewStream)>;

/// A no-op external resolver.
pub fn no_external_bases(
    _oid: &ObjectId,
    _expected: Option<ObjectType>,
) -> Option<(ObjectType, ViewStream)> {
    None
}

/// A resolved packed object: its type plus a seekable stream of its bytes.
pub struct PackObjectStream {
    obj_type: ObjectType,
    view: ViewStream,
}

impl std::fmt::Debug for PackObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackObjectStream")
            .field("obj_type", &self.obj_type)
            .finish()
    }
}

impl PackObjectStream {
    /// The object's logical type.
    pub fn object_type(&self) -> ObjectType {
        self.obj_type
    }

    /// The uncompressed object length.
    pub fn len(&self) -> u64 {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Consume the stream into a byte vector.
    pub fn into_vec(mut self) -> Result<Vec<u8>, PackError> {
        let mut out = Vec::with_capacity(self.len() as usize);
        self.view.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Unwrap the underlying view.
    pub fn into_view(self) -> ViewStream {
        self.view
    }
}

impl Read for PackObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.view.read(buf)
    }
}

impl Seek for PackObjectStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.view.seek(pos)
    }
}

/// A pack file with its index.
pub struct PackFile {
    data: Arc<RandomAccessFile>,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
    cache: Arc<dyn PackMemoryCache>,
    /// id → offset memo. Never invalidated: the pack is immutable for the
    /// lifetime of this handle.
    offsets: Mutex<HashMap<ObjectId, u64>>,
}

impl PackFile {
    /// Open a pack file and its sibling `.idx`.
    pub fn open(
        pack_path: impl AsRef<Path>,
        cache: Arc<dyn PackMemoryCache>,
    ) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let data = RandomAccessFile::open(&pack_path)?;

        if data.len() < PACK_HEADER_SIZE as u64 {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        let mut header = [0u8; PACK_HEADER_SIZE];
        data.read_exact_at(0, &mut header)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self {
            data: Arc::new(data),
            index,
            pack_path,
            num_objects,
            cache,
            offsets: Mutex::new(HashMap::new()),
        })
    }

    /// Read an object by OID as a seekable stream.
    ///
    /// Returns `None` if the OID is not in this pack. `expected` is the
    /// caller's logical type: a plain object of a different type is a
    /// [`PackError::TypeMismatch`], and delta chains inherit it down to
    /// their base.
    pub fn read_stream(
        &self,
        oid: &ObjectId,
        expected: Option<ObjectType>,
        external: ExternalBaseFn<'_>,
    ) -> Result<Option<PackObjectStream>, PackError> {
        match self.lookup_offset(oid)? {
            Some(offset) => self.stream_at_offset(offset, expected, external).map(Some),
            None => Ok(None),
        }
    }

    /// Read the object at a known pack offset.
    pub fn stream_at_offset(
        &self,
        offset: u64,
        expected: Option<ObjectType>,
        external: ExternalBaseFn<'_>,
    ) -> Result<PackObjectStream, PackError> {
        let (obj_type, view) = self.resolve(offset, expected, external, 0)?;
        Ok(PackObjectStream { obj_type, view })
    }

    /// Read just the type and uncompressed size of an object.
    ///
    /// Delta entries only need their program prologue decompressed; the
    /// chain is chased for the type without reconstructing any bytes.
    /// `base_type` answers the type of a REF_DELTA base that lives outside
    /// this pack.
    pub fn read_header(
        &self,
        oid: &ObjectId,
        base_type: &dyn Fn(&ObjectId) -> Option<ObjectType>,
    ) -> Result<Option<(ObjectType, u64)>, PackError> {
        let Some(mut offset) = self.lookup_offset(oid)? else {
            return Ok(None);
        };

        // The outermost entry's size is the object's size; for deltas that
        // is the program's declared result length.
        let mut size: Option<u64> = None;

        for _ in 0..MAX_DELTA_CHAIN_DEPTH {
            let entry = self.entry_at(offset)?;
            match entry.entry_type {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    let obj_type = entry.entry_type.to_object_type().expect("non-delta type");
                    return Ok(Some((obj_type, size.unwrap_or(entry.uncompressed_size))));
                }
                PackEntryType::OfsDelta { base_offset } => {
                    if size.is_none() {
                        size = Some(self.delta_result_len(entry.data_offset)?);
                    }
                    offset = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    if size.is_none() {
                        size = Some(self.delta_result_len(entry.data_offset)?);
                    }
                    match self.lookup_offset(&base_oid)? {
                        Some(base_offset) => offset = base_offset,
                        None => {
                            return match base_type(&base_oid) {
                                Some(t) => Ok(Some((t, size.expect("delta size known")))),
                                None => Err(PackError::MissingBase(base_oid)),
                            };
                        }
                    }
                }
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Check if this pack contains the given OID.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        matches!(self.lookup_offset(oid), Ok(Some(_)))
    }

    /// Get the number of objects in this pack.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Get the pack index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Get the path to the .pack file.
    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// Index lookup with a per-pack memo.
    fn lookup_offset(&self, oid: &ObjectId) -> Result<Option<u64>, PackError> {
        if let Some(offset) = self.offsets.lock().unwrap().get(oid) {
            return Ok(Some(*offset));
        }
        match self.index.lookup(oid)? {
            Some(offset) => {
                self.offsets.lock().unwrap().insert(*oid, offset);
                Ok(Some(offset))
            }
            None => Ok(None),
        }
    }

    /// Resolve the entry at `offset` to its type and a seekable view,
    /// reconstructing delta chains through the cache.
    fn resolve(
        &self,
        offset: u64,
        expected: Option<ObjectType>,
        external: ExternalBaseFn<'_>,
        depth: usize,
    ) -> Result<(ObjectType, ViewStream), PackError> {
        if depth >= MAX_DELTA_CHAIN_DEPTH {
            return Err(PackError::DeltaChainTooDeep {
                offset,
                max_depth: MAX_DELTA_CHAIN_DEPTH,
            });
        }

        let entry = self.entry_at(offset)?;
        match entry.entry_type {
            PackEntryType::Commit
            | PackEntryType::Tree
            | PackEntryType::Blob
            | PackEntryType::Tag => {
                let obj_type = entry.entry_type.to_object_type().expect("non-delta type");
                if let Some(expected) = expected {
                    if obj_type != expected {
                        return Err(PackError::TypeMismatch {
                            offset,
                            expected,
                            actual: obj_type,
                        });
                    }
                }
                let view = match self.cache.try_open(offset) {
                    Some(view) => view,
                    None => self.cache.add(
                        offset,
                        entry.uncompressed_size,
                        Box::new(self.zlib_at(entry.data_offset)),
                    ),
                };
                Ok((obj_type, view))
            }
            PackEntryType::OfsDelta { base_offset } => {
                // Resolving the base also yields the chain's object type
                // and performs the expected-type check.
                let (obj_type, base_view) =
                    self.resolve(base_offset, expected, external, depth + 1)?;
                let view = self.delta_view(offset, &entry, base_view)?;
                Ok((obj_type, view))
            }
            PackEntryType::RefDelta { base_oid } => {
                let (obj_type, base_view) = match self.lookup_offset(&base_oid)? {
                    Some(base_offset) => {
                        self.resolve(base_offset, expected, external, depth + 1)?
                    }
                    None => external(&base_oid, expected)
                        .ok_or(PackError::MissingBase(base_oid))?,
                };
                let view = self.delta_view(offset, &entry, base_view)?;
                Ok((obj_type, view))
            }
        }
    }

    /// Build (or reopen) the cached view over a delta entry's result.
    fn delta_view(
        &self,
        offset: u64,
        entry: &PackEntry,
        base_view: ViewStream,
    ) -> Result<ViewStream, PackError> {
        if let Some(view) = self.cache.try_open(offset) {
            return Ok(view);
        }
        let base_len = base_view.len();
        let delta_src = self.zlib_at(entry.data_offset);
        let stream = DeltaStream::new(base_view, delta_src, base_len, offset)?;
        let result_len = stream.len();
        Ok(self.cache.add(offset, result_len, Box::new(stream)))
    }

    /// Parse the entry header at an absolute pack offset.
    fn entry_at(&self, offset: u64) -> Result<PackEntry, PackError> {
        if offset >= self.data.len() {
            return Err(PackError::CorruptEntry(offset));
        }
        // Entry headers are at most 30 bytes (size varint + base reference).
        let span = (self.data.len() - offset).min(64) as usize;
        let mut buf = [0u8; 64];
        self.data.read_exact_at(offset, &mut buf[..span])?;
        parse_entry_header(&buf[..span], offset)
    }

    /// A zlib decoder positioned at an absolute pack offset.
    fn zlib_at(&self, data_offset: u64) -> ZlibDecoder<FileCursor> {
        ZlibDecoder::new(FileCursor::new(self.data.clone(), data_offset))
    }

    /// Decompress just the result-length varint of a delta program.
    fn delta_result_len(&self, data_offset: u64) -> Result<u64, PackError> {
        let mut decoder = self.zlib_at(data_offset);
        let _base_len = read_size(&mut decoder)?;
        read_size(&mut decoder)
    }
}
