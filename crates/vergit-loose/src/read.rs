use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use vergit_object::header;
use vergit_object::ObjectType;

use crate::{LooseError, LooseObjectStore};

/// Valid second bytes of a zlib stream whose first byte is 0x78.
const ZLIB_FLG: [u8; 4] = [0x01, 0x9c, 0x5e, 0xda];

/// Validate the two-byte zlib header of a loose object file.
pub(crate) fn check_zlib_header(
    compressed: &[u8],
    oid: &vergit_hash::ObjectId,
) -> Result<(), LooseError> {
    if compressed.len() < 2 {
        return Err(LooseError::Corrupt {
            oid: oid.to_hex(),
            reason: "file shorter than zlib header".into(),
        });
    }
    let header = [compressed[0], compressed[1]];
    if header[0] != 0x78 || !ZLIB_FLG.contains(&header[1]) {
        return Err(LooseError::UnsupportedZlib {
            oid: oid.to_hex(),
            header,
        });
    }
    Ok(())
}

impl LooseObjectStore {
    /// Read a loose object's content by OID.
    ///
    /// Returns `Ok(None)` if the object does not exist. A stored type that
    /// does not match `expected` is fatal.
    pub fn read(
        &self,
        oid: &vergit_hash::ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<Vec<u8>>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        check_zlib_header(&compressed, oid)?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(|e| {
            LooseError::Decompress {
                oid: oid.to_hex(),
                source: e,
            }
        })?;

        let (obj_type, content_size, header_len) = header::parse_header(&decompressed)?;
        if let Some(expected) = expected {
            if obj_type != expected {
                return Err(LooseError::TypeMismatch {
                    oid: *oid,
                    expected,
                    actual: obj_type,
                });
            }
        }

        let content = &decompressed[header_len..];
        if content.len() < content_size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!(
                    "declared size {content_size} but only {} content bytes",
                    content.len()
                ),
            });
        }

        Ok(Some(content[..content_size].to_vec()))
    }

    /// Read just the header (type + size) without decompressing the full content.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn read_header(
        &self,
        oid: &vergit_hash::ObjectId,
    ) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        check_zlib_header(&compressed, oid)?;

        // Decompress just enough to read the header (type + size + null byte).
        // Headers are typically < 32 bytes, so 64 is plenty of room.
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; 64];
        let mut filled = 0;

        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder.read(&mut buf[filled..]).map_err(|e| {
                LooseError::Decompress {
                    oid: oid.to_hex(),
                    source: e,
                }
            })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "unexpected EOF before header null terminator".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (obj_type, content_size, _header_len) = header::parse_header(&buf[..filled])?;
        Ok(Some((obj_type, content_size)))
    }
}
