//! Pack index (v2) reading and lookup.
//!
//! The pack index provides fast OID → offset mapping using a fan-out table
//! and binary search. Format:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 values (unused here, skipped over)
//! Offsets: N × 4-byte offsets (high bit = 1 → use 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use vergit_hash::{FanoutTable, ObjectId};

use crate::mapfile::RandomAccessFile;
use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const HASH_LEN: u64 = 20;

impl std::fmt::Debug for PackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackIndex")
            .field("num_objects", &self.num_objects)
            .finish()
    }
}

/// Pack index (v2) providing OID → offset mapping.
pub struct PackIndex {
    file: RandomAccessFile,
    fanout: FanoutTable,
    num_objects: u32,
    /// Byte offset where sorted OIDs start.
    oid_offset: u64,
    /// Byte offset where 32-bit offsets start.
    offset32_offset: u64,
    /// Byte offset where 64-bit offsets start (if any).
    offset64_offset: u64,
    /// Path to the .idx file.
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = RandomAccessFile::open(&idx_path)?;

        // Minimum size: header(8) + fanout(1024) + trailer(2 * 20)
        if file.len() < 8 + 1024 + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }

        let mut header = [0u8; 8];
        file.read_exact_at(0, &mut header)?;
        if header[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedIndexVersion(version));
        }

        let mut fanout_bytes = [0u8; 1024];
        file.read_exact_at(8, &mut fanout_bytes)?;
        let fanout = FanoutTable::parse(&fanout_bytes)
            .map_err(|e| PackError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();

        let n = num_objects as u64;
        let oid_offset = 8 + 1024;
        let crc_offset = oid_offset + n * HASH_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        // The 64-bit table length varies; only the lower bound is checkable.
        let min_size = offset64_offset + 2 * HASH_LEN;
        if file.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                file.len()
            )));
        }

        Ok(Self {
            file,
            fanout,
            num_objects,
            oid_offset,
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    /// Look up an OID, returning the offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Result<Option<u64>, PackError> {
        let range = self.fanout.bucket(oid.first_byte());
        let target = oid.as_bytes();

        let mut low = range.start;
        let mut high = range.end;
        while low < high {
            let mid = low + (high - low) / 2;
            let mid_oid = self.oid_bytes_at(mid as u32)?;
            match mid_oid.cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(self.offset_at_index(mid as u32)?));
                }
            }
        }
        Ok(None)
    }

    /// Look up by OID prefix, returning all matches as (OID, offset) pairs.
    ///
    /// With `ends_with_half_byte` set, the low nibble of the final prefix
    /// byte is ignored: the caller had an odd number of hex digits and
    /// padded the last byte with a zero nibble.
    pub fn lookup_prefix(
        &self,
        prefix: &[u8],
        ends_with_half_byte: bool,
    ) -> Result<Vec<(ObjectId, u64)>, PackError> {
        if prefix.is_empty() || prefix.len() > 20 {
            return Ok(Vec::new());
        }

        let range = self.fanout.bucket(prefix[0]);
        let mut results = Vec::new();
        for i in range {
            let oid_bytes = self.oid_bytes_at(i as u32)?;
            if prefix_matches(&oid_bytes, prefix, ends_with_half_byte) {
                let oid = ObjectId::from_bytes(&oid_bytes)?;
                results.push((oid, self.offset_at_index(i as u32)?));
            }
        }
        Ok(results)
    }

    /// Get the OID at the given sorted index position.
    pub fn oid_at_index(&self, index: u32) -> Result<ObjectId, PackError> {
        Ok(ObjectId::from_bytes(&self.oid_bytes_at(index)?)?)
    }

    /// Get the pack file offset at the given sorted index position.
    ///
    /// Offsets with the high bit set index into the 64-bit table through
    /// their low 31 bits; those are never sign-extended.
    pub fn offset_at_index(&self, index: u32) -> Result<u64, PackError> {
        let mut buf = [0u8; 4];
        self.file
            .read_exact_at(self.offset32_offset + index as u64 * 4, &mut buf)?;
        let val = u32::from_be_bytes(buf);

        if val & 0x8000_0000 != 0 {
            let idx64 = (val & 0x7FFF_FFFF) as u64;
            let mut buf64 = [0u8; 8];
            self.file
                .read_exact_at(self.offset64_offset + idx64 * 8, &mut buf64)?;
            Ok(u64::from_be_bytes(buf64))
        } else {
            Ok(val as u64)
        }
    }

    /// Total number of objects in this index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Path to the .idx file.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Raw OID bytes at the given sorted index position.
    fn oid_bytes_at(&self, index: u32) -> Result<[u8; 20], PackError> {
        let mut buf = [0u8; 20];
        self.file
            .read_exact_at(self.oid_offset + index as u64 * HASH_LEN, &mut buf)?;
        Ok(buf)
    }
}

/// Compare candidate OID bytes against a (possibly half-byte) prefix.
fn prefix_matches(candidate: &[u8; 20], prefix: &[u8], ends_with_half_byte: bool) -> bool {
    let full = if ends_with_half_byte {
        prefix.len() - 1
    } else {
        prefix.len()
    };
    if candidate[..full] != prefix[..full] {
        return false;
    }
    if ends_with_half_byte {
        // Mask the low four bits of the candidate's final byte to zero.
        (candidate[full] & 0xf0) == prefix[full]
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a synthetic v2 pack index in memory for testing.
    fn build_test_index(oids_and_offsets: &[(ObjectId, u64, u32)]) -> Vec<u8> {
        // Sort by OID
        let mut entries: Vec<_> = oids_and_offsets.to_vec();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();

        // Header
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        // Fanout table
        let mut fanout = [0u32; 256];
        for (oid, _, _) in &entries {
            let bucket = oid.first_byte() as usize;
            fanout[bucket] += 1;
        }
        for i in 1..256 {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }

        // OIDs
        for (oid, _, _) in &entries {
            buf.extend_from_slice(oid.as_bytes());
        }

        // CRC32
        for (_, _, crc) in &entries {
            buf.extend_from_slice(&crc.to_be_bytes());
        }

        // 32-bit offsets (no 64-bit for this test helper)
        for (_, offset, _) in &entries {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }

        // Trailer: pack checksum + index checksum (not verified by the reader)
        buf.extend_from_slice(&[0u8; 40]);

        buf
    }

    fn write_test_index(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("test.idx");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn make_oid(first_byte: u8, suffix: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = first_byte;
        bytes[19] = suffix;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn open_and_lookup_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let oid = make_oid(0xab, 0x01);
        let data = build_test_index(&[(oid, 12, 0xdeadbeef)]);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 1);

        // Successful lookup
        assert_eq!(idx.lookup(&oid).unwrap(), Some(12));

        // Missing lookup
        let missing = make_oid(0xab, 0x02);
        assert_eq!(idx.lookup(&missing).unwrap(), None);

        // The all-zero id is never present.
        assert_eq!(idx.lookup(&ObjectId::ZERO).unwrap(), None);
    }

    #[test]
    fn lookup_multiple_objects() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0x00, 0x01), 100, 0x111),
            (make_oid(0x00, 0x02), 200, 0x222),
            (make_oid(0x0a, 0x01), 300, 0x333),
            (make_oid(0xff, 0x01), 400, 0x444),
        ];
        let data = build_test_index(&entries);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 4);

        for (oid, offset, _) in &entries {
            assert_eq!(idx.lookup(oid).unwrap(), Some(*offset));
        }
    }

    #[test]
    fn lookup_yields_recorded_offsets() {
        // Two objects whose fixture pack stores them at offsets 12 and 317.
        let a = ObjectId::from_hex("f5b401f40ad83f13030e946c9ea22cb54cb853cd").unwrap();
        let b = ObjectId::from_hex("d6781552a0a94adbf73ed77696712084754dc274").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let data = build_test_index(&[(a, 12, 0), (b, 317, 0)]);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.lookup(&a).unwrap(), Some(12));
        assert_eq!(idx.lookup(&b).unwrap(), Some(317));
        assert_eq!(idx.lookup(&ObjectId::ZERO).unwrap(), None);
    }

    #[test]
    fn oid_at_index_returns_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xff, 0x01), 100, 0),
            (make_oid(0x00, 0x01), 200, 0),
            (make_oid(0x55, 0x01), 300, 0),
        ];
        let data = build_test_index(&entries);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        // Should be sorted: 0x00, 0x55, 0xff
        assert_eq!(idx.oid_at_index(0).unwrap(), make_oid(0x00, 0x01));
        assert_eq!(idx.oid_at_index(1).unwrap(), make_oid(0x55, 0x01));
        assert_eq!(idx.oid_at_index(2).unwrap(), make_oid(0xff, 0x01));
    }

    #[test]
    fn lookup_prefix_even() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xab, 0x01), 100, 0),
            (make_oid(0xab, 0x02), 200, 0),
            (make_oid(0xac, 0x01), 300, 0),
        ];
        let data = build_test_index(&entries);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        let results = idx.lookup_prefix(&[0xab], false).unwrap();
        assert_eq!(results.len(), 2);
        let results = idx.lookup_prefix(&[0xac], false).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 300);
    }

    #[test]
    fn lookup_prefix_half_byte() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = [0u8; 20];
        a[0] = 0xab;
        a[1] = 0xc5;
        let mut b = [0u8; 20];
        b[0] = 0xab;
        b[1] = 0xd5;
        let entries = vec![
            (ObjectId::from_bytes(&a).unwrap(), 100, 0),
            (ObjectId::from_bytes(&b).unwrap(), 200, 0),
        ];
        let data = build_test_index(&entries);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();

        // Prefix "abc" = bytes [0xab, 0xc0] with a trailing half byte.
        let results = idx.lookup_prefix(&[0xab, 0xc0], true).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 100);

        // Without the half-byte flag the same bytes match nothing.
        let results = idx.lookup_prefix(&[0xab, 0xc0], false).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_test_index(&[]);
        let path = write_test_index(dir.path(), &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 0);
        assert_eq!(idx.lookup(&make_oid(0x00, 0x00)).unwrap(), None);
    }

    #[test]
    fn v1_index_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = build_test_index(&[]);
        data[4..8].copy_from_slice(&1u32.to_be_bytes());
        let path = write_test_index(dir.path(), &data);

        let err = PackIndex::open(&path).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedIndexVersion(1)));
    }

    #[test]
    fn bad_signature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = build_test_index(&[]);
        data[0] = 0x00;
        let path = write_test_index(dir.path(), &data);

        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::InvalidIndex(_))
        ));
    }

    #[test]
    fn index_with_64bit_offsets() {
        // Manually construct an index with a 64-bit offset entry.
        let oid = make_oid(0x42, 0x01);

        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        // Fanout: 1 object at bucket 0x42
        let mut fanout = [0u32; 256];
        for entry in fanout.iter_mut().skip(0x42) {
            *entry = 1;
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }

        // OIDs
        buf.extend_from_slice(oid.as_bytes());

        // CRC32
        buf.extend_from_slice(&0u32.to_be_bytes());

        // 32-bit offset with high bit set, pointing to 64-bit entry 0
        buf.extend_from_slice(&0x8000_0000u32.to_be_bytes());

        // 64-bit offset table: one entry past 2^31
        let large_offset: u64 = 5 * 1024 * 1024 * 1024; // 5GB
        buf.extend_from_slice(&large_offset.to_be_bytes());

        // Trailer
        buf.extend_from_slice(&[0u8; 40]);

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_index(dir.path(), &buf);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 1);
        assert_eq!(idx.lookup(&oid).unwrap(), Some(large_offset));
    }
}
