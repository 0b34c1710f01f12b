//! Lazy delta application as a forward-only byte stream.
//!
//! A [`DeltaStream`] consumes its delta program instruction by instruction
//! while the caller reads, seeking the base for copies and passing delta
//! literals through for inserts. Position equals bytes emitted; seeking is
//! forward-only (backwards seeks come from a cache view over this stream,
//! never from the stream itself).

use std::io::{self, Read, Seek, SeekFrom};

use super::{read_instruction, read_size, DeltaInstruction};
use crate::PackError;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Copy { remaining: u64 },
    Insert { remaining: u64 },
}

/// A reconstructed object, produced lazily from a seekable base and a
/// forward-only delta program.
#[derive(Debug)]
pub struct DeltaStream<B, D> {
    base: B,
    delta: D,
    base_len: u64,
    result_len: u64,
    /// Bytes emitted so far.
    pos: u64,
    current: Option<Pending>,
    finished: bool,
    /// Pack offset of the delta entry, for error reporting.
    entry_offset: u64,
}

impl<B: Read + Seek, D: Read> DeltaStream<B, D> {
    /// Read the program prologue and validate the declared base length
    /// against the actual one.
    pub fn new(
        base: B,
        mut delta: D,
        actual_base_len: u64,
        entry_offset: u64,
    ) -> Result<Self, PackError> {
        let declared_base_len = read_size(&mut delta).map_err(|e| at_offset(e, entry_offset))?;
        let result_len = read_size(&mut delta).map_err(|e| at_offset(e, entry_offset))?;

        if declared_base_len != actual_base_len {
            return Err(PackError::InvalidDelta {
                offset: entry_offset,
                reason: format!(
                    "base size mismatch: delta says {declared_base_len}, base is {actual_base_len}"
                ),
            });
        }

        Ok(Self {
            base,
            delta,
            base_len: declared_base_len,
            result_len,
            pos: 0,
            current: None,
            finished: false,
            entry_offset,
        })
    }

    /// The reconstructed object's length, as declared by the program.
    pub fn len(&self) -> u64 {
        self.result_len
    }

    pub fn is_empty(&self) -> bool {
        self.result_len == 0
    }

    /// Bytes emitted so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn next_instruction(&mut self) -> io::Result<()> {
        match read_instruction(&mut self.delta).map_err(|e| to_io(e, self.entry_offset))? {
            None => {
                self.finished = true;
                if self.pos != self.result_len {
                    return Err(to_io(
                        PackError::InvalidDelta {
                            offset: self.entry_offset,
                            reason: format!(
                                "program produced {} bytes, declared {}",
                                self.pos, self.result_len
                            ),
                        },
                        self.entry_offset,
                    ));
                }
            }
            Some(DeltaInstruction::Copy { offset, size }) => {
                let (offset, size) = (offset as u64, size as u64);
                if offset + size > self.base_len {
                    return Err(to_io(
                        PackError::InvalidDelta {
                            offset: self.entry_offset,
                            reason: format!(
                                "copy out of bounds: offset={offset}, size={size}, base_len={}",
                                self.base_len
                            ),
                        },
                        self.entry_offset,
                    ));
                }
                self.base.seek(SeekFrom::Start(offset))?;
                self.current = Some(Pending::Copy { remaining: size });
            }
            Some(DeltaInstruction::Insert { size }) => {
                self.current = Some(Pending::Insert {
                    remaining: size as u64,
                });
            }
        }
        Ok(())
    }
}

impl<B: Read + Seek, D: Read> Read for DeltaStream<B, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.finished {
                return Ok(0);
            }
            match self.current {
                None => self.next_instruction()?,
                Some(Pending::Copy { remaining }) => {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = self.base.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "delta base ended during copy",
                        ));
                    }
                    let left = remaining - n as u64;
                    self.current = (left > 0).then_some(Pending::Copy { remaining: left });
                    self.pos += n as u64;
                    return Ok(n);
                }
                Some(Pending::Insert { remaining }) => {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = self.delta.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "delta program ended during insert",
                        ));
                    }
                    let left = remaining - n as u64;
                    self.current = (left > 0).then_some(Pending::Insert { remaining: left });
                    self.pos += n as u64;
                    return Ok(n);
                }
            }
        }
    }
}

impl<B: Read + Seek, D: Read> Seek for DeltaStream<B, D> {
    /// Forward-only: a seek to or past the current position discards the
    /// intervening bytes; seeking backwards is not supported.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(d) => self
                .pos
                .checked_add_signed(d)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek overflow"))?,
            SeekFrom::End(d) => self
                .result_len
                .checked_add_signed(d)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek overflow"))?,
        };

        if target < self.pos {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "delta streams cannot seek backwards",
            ));
        }

        let mut scratch = [0u8; 8192];
        while self.pos < target {
            let want = (target - self.pos).min(scratch.len() as u64) as usize;
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
        }
        Ok(self.pos)
    }
}

fn at_offset(e: PackError, offset: u64) -> PackError {
    match e {
        PackError::InvalidDelta { reason, .. } => PackError::InvalidDelta { offset, reason },
        other => other,
    }
}

fn to_io(e: PackError, offset: u64) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, at_offset(e, offset))
}
