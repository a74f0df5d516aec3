//! ZIP archive reader over a random-access data source.
//!
//! The parser touches only the tail of the source (end of central directory
//! records) and the central directory itself; entry data is read lazily when
//! a stream is opened. This keeps opening a nested archive cheap: its bytes
//! are a window into the parent and are never copied.

use std::path::Path;
use std::sync::Arc;

use hashbrown::HashMap;
use matryoshka_common::BinaryReader;
use memchr::memmem;
use tracing::debug;

use crate::decompress::{self, EntryReader};
use crate::entry::ZipEntry;
use crate::format::central_dir::extra_field;
use crate::format::{
    cp437, flags, CentralDirectoryHeader, CompressionMethod, Eocd64Locator, Eocd64Record,
    EocdRecord, LocalFileHeader,
};
use crate::source::{self, DataSource, IoMode, MemorySource, RangeReader, SliceSource};
use crate::{Error, Result};

/// A parsed ZIP archive.
///
/// The entry table is immutable once parsed and can be shared freely between
/// threads; every read goes through the positional [`DataSource`].
pub struct ZipArchive {
    /// Archive bytes
    source: Arc<dyn DataSource>,
    /// Entries in central directory order
    entries: Vec<ZipEntry>,
    /// Entry name to index
    index: HashMap<String, usize>,
    /// Bytes preceding the first local header (e.g. a launch script)
    prefix_len: u64,
}

/// Where the central directory lives, after ZIP64 resolution.
struct DirectoryLocation {
    entry_count: u64,
    offset: u64,
    size: u64,
    prefix_len: u64,
}

impl ZipArchive {
    /// Open a ZIP archive from a file.
    pub fn open<P: AsRef<Path>>(path: P, mode: IoMode) -> Result<Self> {
        let source = source::open_file(path, mode)?;
        Self::from_source(source)
    }

    /// Parse a ZIP archive held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(Arc::new(MemorySource::new(data)))
    }

    /// Parse a ZIP archive from any data source.
    pub fn from_source(source: Arc<dyn DataSource>) -> Result<Self> {
        let location = Self::locate_directory(source.as_ref())?;
        let entries = Self::parse_directory(source.as_ref(), &location)?;

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            // First occurrence wins for duplicated names.
            index.entry(entry.name().to_string()).or_insert(i);
        }

        debug!(
            entries = entries.len(),
            prefix = location.prefix_len,
            size = source.len(),
            "parsed central directory"
        );

        Ok(Self {
            source,
            entries,
            index,
            prefix_len: location.prefix_len,
        })
    }

    /// The underlying data source.
    #[inline]
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Number of bytes before the archive proper.
    #[inline]
    pub fn prefix_len(&self) -> u64 {
        self.prefix_len
    }

    /// Get the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the archive has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in central directory order.
    #[inline]
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Get an entry by exact, case-sensitive name.
    pub fn get(&self, name: &str) -> Option<&ZipEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Get an entry by name, falling back to the directory entry `name/`.
    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.get(name).or_else(|| {
            if name.is_empty() || name.ends_with('/') {
                None
            } else {
                self.get(&format!("{name}/"))
            }
        })
    }

    /// Open a stream over the uncompressed contents of an entry.
    pub fn open_stream(&self, entry: &ZipEntry, verify: bool) -> Result<EntryReader> {
        let method = Self::supported_method(entry)?;
        let raw = self.raw_reader(entry)?;
        let inner = decompress::decoder(method, raw)?;
        Ok(EntryReader::new(
            entry.name(),
            inner,
            entry.crc32(),
            entry.size(),
            verify,
        ))
    }

    /// Read an entry's contents fully.
    pub fn read(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        Ok(self.open_stream(entry, true)?.read_to_vec()?)
    }

    /// Read an entry by name.
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.read(entry)
    }

    /// A data source over an entry's uncompressed bytes.
    ///
    /// Stored entries become a window into this archive's source, so an
    /// archive parsed from it shares the parent's bytes. Compressed entries
    /// are inflated into memory once.
    pub fn entry_source(&self, entry: &ZipEntry, verify: bool) -> Result<Arc<dyn DataSource>> {
        match Self::supported_method(entry)? {
            CompressionMethod::Store => {
                let offset = self.data_offset(entry)?;
                let slice = SliceSource::new(Arc::clone(&self.source), offset, entry.size())?;
                Ok(Arc::new(slice))
            }
            _ => {
                let data = self.open_stream(entry, verify)?.read_to_vec()?;
                Ok(Arc::new(MemorySource::new(data)))
            }
        }
    }

    // Internal methods

    fn supported_method(entry: &ZipEntry) -> Result<CompressionMethod> {
        if entry.is_encrypted() {
            return Err(Error::Encrypted(entry.name().to_string()));
        }
        entry
            .compression_method()
            .map_err(Error::UnsupportedCompression)
    }

    fn raw_reader(&self, entry: &ZipEntry) -> Result<RangeReader> {
        let offset = self.data_offset(entry)?;
        Ok(RangeReader::new(
            Arc::clone(&self.source),
            offset,
            entry.compressed_size(),
        ))
    }

    /// Validate the local header and return the offset of the entry data.
    fn data_offset(&self, entry: &ZipEntry) -> Result<u64> {
        let offset = entry.local_header_offset();
        let header_bytes = self.read_checked(
            "local header",
            offset,
            LocalFileHeader::SIZE_WITH_SIGNATURE as u64,
        )?;

        let mut reader = BinaryReader::new(&header_bytes);
        let sig = reader.read_u32()?;
        if sig != LocalFileHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: LocalFileHeader::SIGNATURE,
                actual: sig,
            });
        }
        let header: LocalFileHeader = reader.read_struct()?;

        let data_offset =
            offset + LocalFileHeader::SIZE_WITH_SIGNATURE as u64 + header.variable_data_size() as u64;
        self.check_bounds("entry data", data_offset, entry.compressed_size())?;
        Ok(data_offset)
    }

    fn check_bounds(&self, what: &'static str, offset: u64, length: u64) -> Result<()> {
        check_bounds(self.source.as_ref(), what, offset, length)
    }

    fn read_checked(&self, what: &'static str, offset: u64, length: u64) -> Result<Vec<u8>> {
        read_checked(self.source.as_ref(), what, offset, length)
    }

    /// Find the EOCD record and resolve the central directory location.
    fn locate_directory(source: &dyn DataSource) -> Result<DirectoryLocation> {
        let size = source.len();
        if size < EocdRecord::SIZE_WITH_SIGNATURE as u64 {
            return Err(Error::EocdNotFound);
        }

        let tail_len = size.min(EocdRecord::MAX_SEARCH as u64);
        let tail_start = size - tail_len;
        let tail = read_checked(source, "archive tail", tail_start, tail_len)?;

        let eocd_offset = Self::find_eocd(&tail)
            .map(|pos| tail_start + pos as u64)
            .ok_or(Error::EocdNotFound)?;

        let record_start = (eocd_offset - tail_start) as usize + 4;
        let mut reader = BinaryReader::new(&tail[record_start..]);
        let eocd: EocdRecord = reader.read_struct()?;

        if eocd.is_zip64() {
            return Self::locate_zip64_directory(source, eocd_offset);
        }

        let cd_size = eocd.central_dir_size as u64;
        let cd_offset = eocd.central_dir_offset as u64;
        let prefix_len = eocd_offset
            .checked_sub(cd_size)
            .and_then(|end| end.checked_sub(cd_offset))
            .ok_or(Error::OutOfBounds {
                what: "central directory",
                offset: cd_offset,
                length: cd_size,
                size,
            })?;

        Ok(DirectoryLocation {
            entry_count: eocd.central_dir_count_total as u64,
            offset: cd_offset + prefix_len,
            size: cd_size,
            prefix_len,
        })
    }

    /// Scan backwards for an EOCD signature whose comment length fits.
    fn find_eocd(tail: &[u8]) -> Option<usize> {
        let finder = memmem::FinderRev::new(&EocdRecord::MAGIC);
        let mut end = tail.len();

        while let Some(pos) = finder.rfind(&tail[..end]) {
            let fixed_end = pos + EocdRecord::SIZE_WITH_SIGNATURE;
            if fixed_end <= tail.len() {
                let comment_len =
                    u16::from_le_bytes([tail[fixed_end - 2], tail[fixed_end - 1]]) as usize;
                if fixed_end + comment_len == tail.len() {
                    return Some(pos);
                }
            }
            if pos == 0 {
                break;
            }
            end = pos + EocdRecord::MAGIC.len() - 1;
        }
        None
    }

    fn locate_zip64_directory(source: &dyn DataSource, eocd_offset: u64) -> Result<DirectoryLocation> {
        let locator_offset = eocd_offset
            .checked_sub(Eocd64Locator::SIZE_WITH_SIGNATURE as u64)
            .ok_or(Error::Zip64EocdNotFound)?;
        let bytes = read_checked(
            source,
            "ZIP64 locator",
            locator_offset,
            Eocd64Locator::SIZE_WITH_SIGNATURE as u64,
        )?;

        let mut reader = BinaryReader::new(&bytes);
        if reader.read_u32()? != Eocd64Locator::SIGNATURE {
            return Err(Error::Zip64EocdNotFound);
        }
        let locator: Eocd64Locator = reader.read_struct()?;

        // Without a prefix the recorded offset is exact. Otherwise the record
        // sits right before the locator and the difference is the prefix.
        let recorded = locator.zip64_eocd_offset;
        let (record_offset, prefix_len) =
            if signature_at(source, recorded) == Some(Eocd64Record::SIGNATURE) {
                (recorded, 0)
            } else {
                let adjacent = locator_offset
                    .checked_sub(Eocd64Record::SIZE_WITH_SIGNATURE as u64)
                    .ok_or(Error::Zip64EocdNotFound)?;
                let prefix_len = adjacent
                    .checked_sub(recorded)
                    .ok_or(Error::Zip64EocdNotFound)?;
                (adjacent, prefix_len)
            };

        let bytes = read_checked(
            source,
            "ZIP64 end of central directory",
            record_offset,
            Eocd64Record::SIZE_WITH_SIGNATURE as u64,
        )?;
        let mut reader = BinaryReader::new(&bytes);
        let sig = reader.read_u32()?;
        if sig != Eocd64Record::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: Eocd64Record::SIGNATURE,
                actual: sig,
            });
        }
        let eocd64: Eocd64Record = reader.read_struct()?;

        Ok(DirectoryLocation {
            entry_count: eocd64.central_dir_count_total,
            offset: eocd64.central_dir_offset + prefix_len,
            size: eocd64.central_dir_size,
            prefix_len,
        })
    }

    fn parse_directory(source: &dyn DataSource, location: &DirectoryLocation) -> Result<Vec<ZipEntry>> {
        let directory = read_checked(source, "central directory", location.offset, location.size)?;
        let mut reader = BinaryReader::new(&directory);

        // Each record is at least 46 bytes; never trust the count blindly.
        let capacity = (location.entry_count as usize).min(directory.len() / 46);
        let mut entries = Vec::with_capacity(capacity);

        for _ in 0..location.entry_count {
            let entry = Self::read_cd_entry(&mut reader, location.prefix_len)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    fn read_cd_entry(reader: &mut BinaryReader<'_>, prefix_len: u64) -> Result<ZipEntry> {
        let sig = reader.read_u32()?;
        if sig != CentralDirectoryHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: CentralDirectoryHeader::SIGNATURE,
                actual: sig,
            });
        }

        let header: CentralDirectoryHeader = reader.read_struct()?;

        let name_bytes = reader.read_bytes(header.file_name_length as usize)?;
        let name = cp437::decode_name(name_bytes, header.flags & flags::UTF8 != 0);

        let mut compressed_size = header.compressed_size as u64;
        let mut uncompressed_size = header.uncompressed_size as u64;
        let mut local_header_offset = header.local_header_offset as u64;

        let extra = reader.read_bytes(header.extra_field_length as usize)?;
        let mut extra_reader = BinaryReader::new(extra);

        while extra_reader.remaining() >= 4 {
            let id = extra_reader.read_u16()?;
            let size = extra_reader.read_u16()? as usize;
            let data = extra_reader.read_bytes(size)?;

            if id != extra_field::ZIP64 {
                continue;
            }

            // Only the fields saturated in the fixed header are present, in order.
            let mut zip64 = BinaryReader::new(data);
            if header.uncompressed_size == u32::MAX {
                uncompressed_size = zip64.read_u64()?;
            }
            if header.compressed_size == u32::MAX {
                compressed_size = zip64.read_u64()?;
            }
            if header.local_header_offset == u32::MAX {
                local_header_offset = zip64.read_u64()?;
            }
        }

        reader.advance(header.file_comment_length as usize);

        Ok(ZipEntry::new(
            name,
            compressed_size,
            uncompressed_size,
            header.compression_method,
            header.flags,
            local_header_offset + prefix_len,
            header.last_modified,
            header.crc32,
        ))
    }
}

fn check_bounds(source: &dyn DataSource, what: &'static str, offset: u64, length: u64) -> Result<()> {
    let size = source.len();
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds {
            what,
            offset,
            length,
            size,
        }),
    }
}

fn signature_at(source: &dyn DataSource, offset: u64) -> Option<u32> {
    let bytes = read_checked(source, "signature", offset, 4).ok()?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_checked(source: &dyn DataSource, what: &'static str, offset: u64, length: u64) -> Result<Vec<u8>> {
    check_bounds(source, what, offset, length)?;
    Ok(source::read_vec_at(source, offset, length as usize)?)
}

impl std::fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("size", &self.source.len())
            .field("entries", &self.entries.len())
            .field("prefix_len", &self.prefix_len)
            .finish()
    }
}
