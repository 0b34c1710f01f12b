//! Pack memory cache: shared, seekable views over forward-only streams.
//!
//! Decompression and delta application both produce forward-only byte
//! sources, but a delta needs random seeks over its base. A cache entry
//! owns a grow-only buffer fed from the source under a lock; any number of
//! [`ViewStream`] handles read from the buffer at independent positions.
//! Once the buffer covers the source's full length, the source is dropped,
//! so a second reader costs no decompression work.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

struct Inner {
    source: Option<Box<dyn Read + Send>>,
    buf: Vec<u8>,
    total_len: u64,
}

/// A shared buffer over one packed object's reconstructed bytes.
pub struct CacheEntry {
    inner: Mutex<Inner>,
}

impl CacheEntry {
    fn new(total_len: u64, source: Box<dyn Read + Send>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                source: Some(source),
                buf: Vec::new(),
                total_len,
            }),
        })
    }

    fn total_len(&self) -> u64 {
        self.inner.lock().unwrap().total_len
    }

    /// Copy bytes at `pos` into `buf`, pulling from the source as needed.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if pos >= inner.total_len || buf.is_empty() {
            return Ok(0);
        }
        let want_end = (pos + buf.len() as u64).min(inner.total_len);

        while (inner.buf.len() as u64) < want_end && inner.source.is_some() {
            let start = inner.buf.len();
            let need = (want_end - start as u64) as usize;
            let cap = (inner.total_len - start as u64) as usize;
            let chunk = need.max(8 * 1024).min(cap);
            inner.buf.resize(start + chunk, 0);

            let result = {
                let Inner { source, buf, .. } = &mut *inner;
                source.as_mut().unwrap().read(&mut buf[start..])
            };
            match result {
                Ok(0) => {
                    // Source ended early; serve what was buffered.
                    inner.buf.truncate(start);
                    inner.source = None;
                }
                Ok(n) => inner.buf.truncate(start + n),
                Err(e) => {
                    inner.buf.truncate(start);
                    return Err(e);
                }
            }
        }

        if inner.buf.len() as u64 >= inner.total_len {
            inner.source = None;
        }

        let buffered = inner.buf.len() as u64;
        if pos >= buffered {
            return Ok(0);
        }
        let end = want_end.min(buffered) as usize;
        let lo = pos as usize;
        let n = end - lo;
        buf[..n].copy_from_slice(&inner.buf[lo..end]);
        Ok(n)
    }
}

/// A position-independent view over a [`CacheEntry`].
///
/// Cheap to create; each view holds only its own cursor and a reference to
/// the shared buffer. Seeks anywhere within the entry are supported.
pub struct ViewStream {
    entry: Arc<CacheEntry>,
    pos: u64,
}

impl ViewStream {
    fn over(entry: Arc<CacheEntry>) -> Self {
        Self { entry, pos: 0 }
    }

    /// Wrap a forward-only source in a private, unshared view.
    ///
    /// Used for delta bases that live outside any pack (loose objects,
    /// alternate stores) and by [`NullCache`].
    pub fn detached(total_len: u64, source: Box<dyn Read + Send>) -> Self {
        Self::over(CacheEntry::new(total_len, source))
    }

    /// The full length of the underlying object.
    pub fn len(&self) -> u64 {
        self.entry.total_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh view over the same bytes, positioned at the start.
    pub fn reopen(&self) -> ViewStream {
        ViewStream::over(self.entry.clone())
    }
}

impl Read for ViewStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.entry.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ViewStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.len().checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of view")
        })?;
        self.pos = target;
        Ok(self.pos)
    }
}

/// The cache interface packs read through.
pub trait PackMemoryCache: Send + Sync {
    /// Wrap a forward-only `source` of known decompressed length, register
    /// it under the packed-object `offset`, and return a seekable view.
    fn add(&self, offset: u64, total_len: u64, source: Box<dyn Read + Send>) -> ViewStream;

    /// Open a fresh, independent view on a cached entry if present.
    fn try_open(&self, offset: u64) -> Option<ViewStream>;
}

/// Shared pack memory cache, keyed by packed-object offset.
///
/// Entries live for the lifetime of the owning repository handle; packs
/// are immutable while open, so there is no invalidation.
#[derive(Default)]
pub struct PackCache {
    entries: Mutex<HashMap<u64, Arc<CacheEntry>>>,
}

impl PackCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PackMemoryCache for PackCache {
    fn add(&self, offset: u64, total_len: u64, source: Box<dyn Read + Send>) -> ViewStream {
        let entry = CacheEntry::new(total_len, source);
        self.entries.lock().unwrap().insert(offset, entry.clone());
        ViewStream::over(entry)
    }

    fn try_open(&self, offset: u64) -> Option<ViewStream> {
        self.entries
            .lock()
            .unwrap()
            .get(&offset)
            .map(|entry| ViewStream::over(entry.clone()))
    }
}

/// A cache that retains nothing.
///
/// `add` still returns a seekable view (delta bases need seeks), but the
/// entry is private to that view and `try_open` always misses. For
/// repositories where deltas are rare and memory is precious.
pub struct NullCache;

impl PackMemoryCache for NullCache {
    fn add(&self, _offset: u64, total_len: u64, source: Box<dyn Read + Send>) -> ViewStream {
        ViewStream::detached(total_len, source)
    }

    fn try_open(&self, _offset: u64) -> Option<ViewStream> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A source that counts how many bytes it has handed out.
    struct CountingSource {
        data: Vec<u8>,
        pos: usize,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            if n > 0 {
                self.reads.fetch_add(n, Ordering::SeqCst);
            }
            Ok(n)
        }
    }

    fn counted(data: Vec<u8>) -> (Box<dyn Read + Send>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Box::new(CountingSource {
                data,
                pos: 0,
                reads: reads.clone(),
            }),
            reads,
        )
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn add_then_read_full() {
        let cache = PackCache::new();
        let data = sample(1000);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(42, 1000, source);
        assert_eq!(view.len(), 1000);

        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn second_read_pulls_nothing_from_source() {
        let cache = PackCache::new();
        let data = sample(20_000);
        let (source, reads) = counted(data.clone());

        let mut view1 = cache.add(7, data.len() as u64, source);
        let mut out1 = Vec::new();
        view1.read_to_end(&mut out1).unwrap();
        assert_eq!(out1, data);
        let after_first = reads.load(Ordering::SeqCst);
        assert_eq!(after_first, data.len());

        let mut view2 = cache.try_open(7).expect("entry should be cached");
        let mut out2 = Vec::new();
        view2.read_to_end(&mut out2).unwrap();
        assert_eq!(out2, data);

        // The buffer is complete, so the source is gone and no further
        // bytes were pulled.
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn views_have_independent_positions() {
        let cache = PackCache::new();
        let data = sample(100);
        let (source, _) = counted(data.clone());

        let mut view1 = cache.add(0, 100, source);
        let mut view2 = cache.try_open(0).unwrap();

        let mut a = [0u8; 10];
        view1.read_exact(&mut a).unwrap();
        assert_eq!(a, data[..10]);

        // view2 is still at the start.
        let mut b = [0u8; 10];
        view2.read_exact(&mut b).unwrap();
        assert_eq!(b, data[..10]);

        // And view1 continues where it left off.
        view1.read_exact(&mut a).unwrap();
        assert_eq!(a, data[10..20]);
    }

    #[test]
    fn seek_backwards_is_cheap_and_correct() {
        let cache = PackCache::new();
        let data = sample(500);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(0, 500, source);
        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();

        view.seek(SeekFrom::Start(100)).unwrap();
        let mut buf = [0u8; 50];
        view.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[100..150]);
    }

    #[test]
    fn seek_forward_past_buffered_extent_reads_through() {
        let cache = PackCache::new();
        let data = sample(1000);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(0, 1000, source);
        view.seek(SeekFrom::Start(900)).unwrap();
        let mut buf = [0u8; 100];
        view.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[900..]);

        // The skipped-over bytes were buffered, not lost.
        let mut view2 = cache.try_open(0).unwrap();
        let mut head = [0u8; 10];
        view2.read_exact(&mut head).unwrap();
        assert_eq!(head, data[..10]);
    }

    #[test]
    fn seek_from_end() {
        let cache = PackCache::new();
        let data = sample(100);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(0, 100, source);
        view.seek(SeekFrom::End(-10)).unwrap();
        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();
        assert_eq!(out, data[90..]);
    }

    #[test]
    fn reads_past_end_return_zero() {
        let cache = PackCache::new();
        let (source, _) = counted(sample(10));
        let mut view = cache.add(0, 10, source);
        view.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(view.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_source_serves_what_it_has() {
        let cache = PackCache::new();
        // Source claims 100 bytes but only delivers 60.
        let (source, _) = counted(sample(60));
        let mut view = cache.add(0, 100, source);
        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 60);
    }

    #[test]
    fn concurrent_views_interleave_safely() {
        let cache = Arc::new(PackCache::new());
        let data = sample(64 * 1024);
        let (source, _) = counted(data.clone());
        drop(cache.add(3, data.len() as u64, source));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let expected = data.clone();
            handles.push(std::thread::spawn(move || {
                let mut view = cache.try_open(3).unwrap();
                let mut out = Vec::new();
                view.read_to_end(&mut out).unwrap();
                assert_eq!(out, expected);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn null_cache_never_retains() {
        let cache = NullCache;
        let data = sample(100);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(5, 100, source);
        let mut out = Vec::new();
        view.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);

        assert!(cache.try_open(5).is_none());
    }

    #[test]
    fn null_cache_views_still_seek() {
        let cache = NullCache;
        let data = sample(100);
        let (source, _) = counted(data.clone());

        let mut view = cache.add(5, 100, source);
        view.seek(SeekFrom::Start(40)).unwrap();
        let mut buf = [0u8; 10];
        view.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[40..50]);
        view.seek(SeekFrom::Start(0)).unwrap();
        view.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data[..10]);
    }
}
