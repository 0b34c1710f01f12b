//! Random-access views over pack and index files.
//!
//! On 64-bit hosts the file is memory-mapped through a single sliding
//! window; requests outside the window drop the old mapping and remap.
//! On 32-bit hosts, where address space is scarce, the same interface is
//! served by a locked seek-and-read file handle.

use std::io::{self, Read};
use std::sync::Arc;

/// Default window width for mapped access.
pub const DEFAULT_WINDOW: u64 = 10 * 1024 * 1024;

/// Window starts snap down to this boundary, which satisfies mapping
/// granularity on every supported platform.
#[cfg(target_pointer_width = "64")]
const WINDOW_ALIGN: u64 = 64 * 1024;

#[cfg(target_pointer_width = "64")]
mod backend {
    use std::fs::File;
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;

    use memmap2::{Mmap, MmapOptions};

    use super::{DEFAULT_WINDOW, WINDOW_ALIGN};

    struct Window {
        start: u64,
        map: Mmap,
    }

    impl Window {
        fn contains(&self, offset: u64, end: u64) -> bool {
            self.start <= offset && end <= self.start + self.map.len() as u64
        }
    }

    /// Windowed memory-mapped file.
    pub struct RandomAccessFile {
        file: File,
        len: u64,
        window: Mutex<Option<Window>>,
    }

    impl RandomAccessFile {
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok(Self {
                file,
                len,
                window: Mutex::new(None),
            })
        }

        pub fn len(&self) -> u64 {
            self.len
        }

        pub fn is_empty(&self) -> bool {
            self.len == 0
        }

        /// Read exactly `buf.len()` bytes starting at `offset`.
        ///
        /// A request outside the current window releases the old mapping
        /// and maps a fresh one sized `max(DEFAULT_WINDOW, requested)`,
        /// clamped to the file length. One lookup runs at a time, so no
        /// span borrowed from a previous window can still be alive here.
        pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            if buf.is_empty() {
                return Ok(());
            }
            let end = offset
                .checked_add(buf.len() as u64)
                .filter(|&end| end <= self.len)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("read of {} bytes at {offset} past end of file", buf.len()),
                    )
                })?;

            let mut window = self.window.lock().unwrap();
            let hit = window.as_ref().is_some_and(|w| w.contains(offset, end));
            if !hit {
                let start = offset & !(WINDOW_ALIGN - 1);
                let want = (end - start).max(DEFAULT_WINDOW);
                let map_len = want.min(self.len - start) as usize;
                // SAFETY: the file is opened read-only and packs/indexes are
                // immutable for the lifetime of the repository handle.
                let map = unsafe {
                    MmapOptions::new()
                        .offset(start)
                        .len(map_len)
                        .map(&self.file)?
                };
                *window = Some(Window { start, map });
            }

            let w = window.as_ref().unwrap();
            let lo = (offset - w.start) as usize;
            buf.copy_from_slice(&w.map[lo..lo + buf.len()]);
            Ok(())
        }
    }
}

#[cfg(not(target_pointer_width = "64"))]
mod backend {
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom};
    use std::path::Path;
    use std::sync::Mutex;

    /// Seek-and-read file access for hosts without room to map packs.
    pub struct RandomAccessFile {
        file: Mutex<File>,
        len: u64,
    }

    impl RandomAccessFile {
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok(Self {
                file: Mutex::new(file),
                len,
            })
        }

        pub fn len(&self) -> u64 {
            self.len
        }

        pub fn is_empty(&self) -> bool {
            self.len == 0
        }

        pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            if buf.is_empty() {
                return Ok(());
            }
            offset
                .checked_add(buf.len() as u64)
                .filter(|&end| end <= self.len)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("read of {} bytes at {offset} past end of file", buf.len()),
                    )
                })?;

            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(buf)
        }
    }
}

pub use backend::RandomAccessFile;

/// Forward-reading cursor over a shared [`RandomAccessFile`].
///
/// Feeds zlib decoders, which want a plain [`Read`] positioned at the
/// start of a compressed span.
pub struct FileCursor {
    file: Arc<RandomAccessFile>,
    pos: u64,
}

impl FileCursor {
    pub fn new(file: Arc<RandomAccessFile>, pos: u64) -> Self {
        Self { file, pos }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for FileCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.file.len().saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(remaining) as usize;
        self.file.read_exact_at(self.pos, &mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}
