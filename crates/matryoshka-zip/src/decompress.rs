//! Streaming decompression of entry data.

use std::fmt;
use std::io::{self, BufReader, Read};

use flate2::read::DeflateDecoder;

use crate::format::CompressionMethod;
use crate::source::RangeReader;
use crate::{Error, Result};

/// Wrap the raw entry bytes in the decoder for `method`.
pub(crate) fn decoder(
    method: CompressionMethod,
    raw: RangeReader,
) -> Result<Box<dyn Read + Send>> {
    Ok(match method {
        CompressionMethod::Store => Box::new(raw),
        CompressionMethod::Deflate => Box::new(DeflateDecoder::new(BufReader::new(raw))),
        CompressionMethod::Zstd => Box::new(
            zstd::Decoder::new(raw).map_err(|e| Error::Decompression(e.to_string()))?,
        ),
    })
}

/// A stream over the uncompressed contents of one entry.
///
/// When verification is enabled the byte count and CRC-32 are checked once
/// the decoder reports end of stream; a mismatch surfaces as
/// [`io::ErrorKind::InvalidData`].
pub struct EntryReader {
    name: String,
    inner: Box<dyn Read + Send>,
    hasher: crc32fast::Hasher,
    expected_crc: u32,
    expected_size: u64,
    read: u64,
    verify: bool,
    finished: bool,
}

impl EntryReader {
    pub(crate) fn new(
        name: &str,
        inner: Box<dyn Read + Send>,
        expected_crc: u32,
        expected_size: u64,
        verify: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            inner,
            hasher: crc32fast::Hasher::new(),
            expected_crc,
            expected_size,
            read: 0,
            verify,
            finished: false,
        }
    }

    /// Name of the entry being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size recorded for the entry.
    pub fn size(&self) -> u64 {
        self.expected_size
    }

    /// Read the remainder of the entry into a vector.
    pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        let remaining = self.expected_size.saturating_sub(self.read);
        let mut out = Vec::with_capacity(remaining.min(64 * 1024 * 1024) as usize);
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        if !self.verify {
            return Ok(());
        }
        if self.read != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{}: expected {} bytes, got {}",
                    self.name, self.expected_size, self.read
                ),
            ));
        }
        let actual = std::mem::take(&mut self.hasher).finalize();
        if actual != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{}: CRC-32 mismatch: expected {:#010x}, got {:#010x}",
                    self.name, self.expected_crc, actual
                ),
            ));
        }
        Ok(())
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let n = loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };

        if n == 0 {
            self.finish()?;
            return Ok(0);
        }

        self.read += n as u64;
        if self.verify {
            self.hasher.update(&buf[..n]);
            if self.read > self.expected_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "{}: more than the recorded {} bytes",
                        self.name, self.expected_size
                    ),
                ));
            }
        }
        Ok(n)
    }
}

impl fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryReader")
            .field("name", &self.name)
            .field("size", &self.expected_size)
            .field("read", &self.read)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::source::{DataSource, MemorySource};

    fn range(data: Vec<u8>) -> RangeReader {
        let len = data.len() as u64;
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new(data));
        RangeReader::new(source, 0, len)
    }

    fn crc(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    #[test]
    fn test_zstd_stream() {
        let original = b"Hello, World! This is a test of Zstandard compression.";
        let compressed = zstd::encode_all(&original[..], 3).unwrap();

        let inner = decoder(CompressionMethod::Zstd, range(compressed)).unwrap();
        let reader = EntryReader::new("z", inner, crc(original), original.len() as u64, true);

        assert_eq!(reader.read_to_vec().unwrap(), original);
    }

    #[test]
    fn test_deflate_stream() {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let original = b"Hello, World! This is a test of DEFLATE compression.";
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let inner = decoder(CompressionMethod::Deflate, range(compressed)).unwrap();
        let reader = EntryReader::new("d", inner, crc(original), original.len() as u64, true);

        assert_eq!(reader.read_to_vec().unwrap(), original);
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let inner = decoder(CompressionMethod::Store, range(b"abc".to_vec())).unwrap();
        let reader = EntryReader::new("bad", inner, 0xDEADBEEF, 3, true);

        let err = reader.read_to_vec().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_crc_mismatch_ignored_without_verification() {
        let inner = decoder(CompressionMethod::Store, range(b"abc".to_vec())).unwrap();
        let reader = EntryReader::new("bad", inner, 0xDEADBEEF, 3, false);

        assert_eq!(reader.read_to_vec().unwrap(), b"abc");
    }

    #[test]
    fn test_size_mismatch_detected() {
        let data = b"abcd".to_vec();
        let expected = crc(&data);
        let inner = decoder(CompressionMethod::Store, range(data)).unwrap();
        let reader = EntryReader::new("short", inner, expected, 2, true);

        let err = reader.read_to_vec().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
