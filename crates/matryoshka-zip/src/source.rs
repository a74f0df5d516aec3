//! Random-access byte sources for archive data.
//!
//! Every read of archive bytes goes through [`DataSource::read_at`], which
//! takes an explicit offset and never moves a shared cursor. No source is
//! torn down when a read is interrupted, so a failed read can simply be
//! issued again. [`read_exact_at`] and [`RangeReader`] do exactly that for
//! [`io::ErrorKind::Interrupted`], which makes entry streaming immune to
//! signal-interrupted system calls and to the caller's interruption flag
//! (see [`matryoshka_common::interrupt`]), which is never consulted here.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

/// How root archives are read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Memory-map the whole file.
    #[default]
    Mapped,
    /// Positional reads on a shared file handle.
    Positional,
}

/// A fixed-length byte source supporting reads at arbitrary offsets.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Whether the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns `Ok(0)` at or past the end. May fail with
    /// [`io::ErrorKind::Interrupted`], in which case the read can be retried.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Fill `buf` from `offset`, reissuing interrupted reads.
pub fn read_exact_at(source: &dyn DataSource, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match source.read_at(offset, buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("source ended at offset {offset}"),
                ))
            }
            Ok(n) => {
                offset += n as u64;
                buf = &mut buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read exactly `len` bytes at `offset` into a new buffer.
pub fn read_vec_at(source: &dyn DataSource, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact_at(source, offset, &mut buf)?;
    Ok(buf)
}

/// Open a file as a data source.
pub fn open_file<P: AsRef<Path>>(path: P, mode: IoMode) -> io::Result<Arc<dyn DataSource>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    if len == 0 {
        return Ok(Arc::new(MemorySource::new(Vec::new())));
    }

    Ok(match mode {
        IoMode::Mapped => Arc::new(MappedSource::new(&file)?),
        IoMode::Positional => Arc::new(FileSource { file, len }),
    })
}

fn copy_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    if offset >= data.len() as u64 {
        return 0;
    }
    let start = offset as usize;
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

/// A memory-mapped file.
pub struct MappedSource {
    mmap: Mmap,
}

impl MappedSource {
    /// Map an open file.
    pub fn new(file: &File) -> io::Result<Self> {
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap })
    }
}

impl DataSource for MappedSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_at(&self.mmap, offset, buf))
    }
}

impl fmt::Debug for MappedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedSource")
            .field("len", &self.mmap.len())
            .finish()
    }
}

/// A file read with positional reads.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    /// Wrap an open file.
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl DataSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;

        if offset >= self.len {
            return Ok(0);
        }
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;

        if offset >= self.len {
            return Ok(0);
        }
        self.file.seek_read(buf, offset)
    }
}

/// Bytes held in memory, e.g. a compressed nested archive after inflation.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Take ownership of a buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

impl DataSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_at(&self.data, offset, buf))
    }
}

/// A window into another source.
///
/// Holds the parent alive for as long as the window exists.
#[derive(Debug, Clone)]
pub struct SliceSource {
    parent: Arc<dyn DataSource>,
    offset: u64,
    len: u64,
}

impl SliceSource {
    /// Create a window of `len` bytes at `offset` in `parent`.
    pub fn new(parent: Arc<dyn DataSource>, offset: u64, len: u64) -> io::Result<Self> {
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > parent.len()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "slice {offset}+{len} exceeds source length {}",
                    parent.len()
                ),
            ));
        }
        Ok(Self {
            parent,
            offset,
            len,
        })
    }

    /// The source this window reads from.
    pub fn parent(&self) -> &Arc<dyn DataSource> {
        &self.parent
    }

    /// Start of the window in the parent.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl DataSource for SliceSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - offset) as usize);
        self.parent.read_at(self.offset + offset, &mut buf[..n])
    }
}

/// Sequential reader over a byte range of a source.
///
/// Interrupted reads are reissued internally, so callers never observe
/// [`io::ErrorKind::Interrupted`] from this reader.
#[derive(Debug)]
pub struct RangeReader {
    source: Arc<dyn DataSource>,
    position: u64,
    end: u64,
}

impl RangeReader {
    /// Read `len` bytes starting at `offset`.
    pub fn new(source: Arc<dyn DataSource>, offset: u64, len: u64) -> Self {
        Self {
            source,
            position: offset,
            end: offset.saturating_add(len),
        }
    }

    /// Bytes left in the range.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.position)
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);

        loop {
            match self.source.read_at(self.position, &mut buf[..want]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("entry data truncated at offset {}", self.position),
                    ))
                }
                Ok(n) => {
                    self.position += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use matryoshka_common::interrupt;

    /// Fails every other read with `Interrupted` and raises the caller's flag.
    #[derive(Debug)]
    struct FlakySource {
        inner: MemorySource,
        calls: AtomicUsize,
    }

    impl DataSource for FlakySource {
        fn len(&self) -> u64 {
            self.inner.len()
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                interrupt::interrupt_current();
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            // Short reads exercise the retry loops too.
            let n = buf.len().min(3);
            self.inner.read_at(offset, &mut buf[..n])
        }
    }

    fn flaky(data: &[u8]) -> Arc<dyn DataSource> {
        Arc::new(FlakySource {
            inner: MemorySource::new(data.to_vec()),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_read_exact_at_retries_interrupted_reads() {
        std::thread::spawn(|| {
            let source = flaky(b"0123456789");
            let mut buf = [0u8; 6];
            read_exact_at(source.as_ref(), 2, &mut buf).unwrap();
            assert_eq!(&buf, b"234567");
            assert!(interrupt::interrupted());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_range_reader_retries_interrupted_reads() {
        std::thread::spawn(|| {
            interrupt::interrupt_current();
            let mut reader = RangeReader::new(flaky(b"hello, nested world"), 7, 6);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"nested");
            assert!(interrupt::interrupted());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_read_exact_at_past_end() {
        let source = MemorySource::new(b"abc".to_vec());
        let mut buf = [0u8; 4];
        let err = read_exact_at(&source, 0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_slice_source_bounds_and_keep_alive() {
        let parent: Arc<dyn DataSource> = Arc::new(MemorySource::new(b"outer[inner]outer".to_vec()));
        let slice = SliceSource::new(Arc::clone(&parent), 6, 5).unwrap();
        drop(parent);

        assert_eq!(slice.len(), 5);
        assert_eq!(read_vec_at(&slice, 0, 5).unwrap(), b"inner");

        let mut buf = [0u8; 8];
        assert_eq!(slice.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"er");
        assert_eq!(slice.read_at(5, &mut buf).unwrap(), 0);

        assert!(SliceSource::new(Arc::clone(slice.parent()), 10, 8).is_err());
    }

    #[test]
    fn test_range_reader_detects_truncation() {
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new(b"short".to_vec()));
        let mut reader = RangeReader::new(source, 2, 10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_open_file_modes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"positional and mapped").unwrap();
        file.flush().unwrap();

        for mode in [IoMode::Mapped, IoMode::Positional] {
            let source = open_file(file.path(), mode).unwrap();
            assert_eq!(source.len(), 21);
            assert_eq!(read_vec_at(source.as_ref(), 15, 6).unwrap(), b"mapped");
        }
    }

    #[test]
    fn test_open_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = open_file(file.path(), IoMode::Mapped).unwrap();
        assert!(source.is_empty());
    }
}
