//! ZIP archive entry.

use std::time::SystemTime;

use crate::format::{flags, CompressionMethod};

/// An entry (file or directory) within a ZIP archive.
///
/// This contains metadata about the entry, not the entry data itself.
/// Use [`ZipArchive::open_stream`](crate::ZipArchive::open_stream) to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Slash-separated path within the archive; directories end with `/`.
    name: String,
    /// Compressed size in bytes.
    compressed_size: u64,
    /// Uncompressed size in bytes.
    uncompressed_size: u64,
    /// Raw compression method from the central directory.
    method: u16,
    /// General purpose bit flags.
    flags: u16,
    /// Absolute offset of the local file header in the archive source.
    local_header_offset: u64,
    /// DOS date/time of last modification.
    dos_datetime: u32,
    /// CRC32 checksum of uncompressed data.
    crc32: u32,
}

impl ZipEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        compressed_size: u64,
        uncompressed_size: u64,
        method: u16,
        flags: u16,
        local_header_offset: u64,
        dos_datetime: u32,
        crc32: u32,
    ) -> Self {
        Self {
            name,
            compressed_size,
            uncompressed_size,
            method,
            flags,
            local_header_offset,
            dos_datetime,
            crc32,
        }
    }

    /// Get the entry name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the compressed size in bytes.
    #[inline]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Get the uncompressed size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Get the compression method, or the raw tag if it is not supported.
    #[inline]
    pub fn compression_method(&self) -> Result<CompressionMethod, u16> {
        CompressionMethod::try_from(self.method)
    }

    /// Check if the entry is encrypted.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & flags::ENCRYPTED != 0
    }

    /// Get the offset to the local file header.
    #[inline]
    pub(crate) fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    /// Get the CRC32 checksum.
    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Get the last modification time.
    ///
    /// Returns None if the DOS datetime is invalid. DOS timestamps carry no
    /// zone, so the value is interpreted as UTC.
    pub fn last_modified(&self) -> Option<SystemTime> {
        dos_datetime_to_system_time(self.dos_datetime)
    }

    /// Check if this entry represents a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Convert DOS date/time format to SystemTime.
///
/// - Time: bits 0-4 = seconds/2, bits 5-10 = minutes, bits 11-15 = hours
/// - Date: bits 16-20 = day, bits 21-24 = month, bits 25-31 = year-1980
fn dos_datetime_to_system_time(datetime: u32) -> Option<SystemTime> {
    let year = 1980 + ((datetime >> 25) & 0x7F) as i32;
    let month = (datetime >> 21) & 0x0F;
    let day = (datetime >> 16) & 0x1F;
    let hour = (datetime >> 11) & 0x1F;
    let minute = (datetime >> 5) & 0x3F;
    let second = (datetime & 0x1F) * 2;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut days = 0i64;
    for y in 1970..year {
        days += if is_leap_year(y) { 366 } else { 365 };
    }
    for m in 1..month {
        days += DAYS_IN_MONTH[(m - 1) as usize] as i64;
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }
    days += (day - 1) as i64;

    let secs = days * 86400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;

    std::time::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(secs as u64))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
