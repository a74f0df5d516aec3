//! Local File Header structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Local File Header (without signature).
///
/// Precedes the entry data. Only the name and extra field lengths are
/// trusted; sizes come from the central directory, since entries written
/// with a data descriptor leave them zeroed here.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct LocalFileHeader {
    /// Version needed to extract
    pub version_needed: u16,
    /// General purpose bit flag
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// File last modification time and date (DOS format)
    pub last_modified: u32,
    /// CRC-32 of uncompressed data
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u32,
    /// Uncompressed size
    pub uncompressed_size: u32,
    /// File name length
    pub file_name_length: u16,
    /// Extra field length
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Local File Header signature as u32.
    pub const SIGNATURE: u32 = 0x04034b50;

    /// Size of the header including its signature.
    pub const SIZE_WITH_SIGNATURE: usize = 4 + std::mem::size_of::<Self>();

    /// Total variable-length data size following this header.
    pub fn variable_data_size(&self) -> usize {
        self.file_name_length as usize + self.extra_field_length as usize
    }
}
