//! ZIP format records.
//!
//! This module contains the low-level records of the ZIP container,
//! including ZIP64 extensions.

pub mod central_dir;
pub mod cp437;
mod eocd;
mod local;

pub use central_dir::CentralDirectoryHeader;
pub use eocd::{Eocd64Locator, Eocd64Record, EocdRecord};
pub use local::LocalFileHeader;

/// Compression methods supported for entry streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// DEFLATE compression.
    Deflate = 8,
    /// Zstandard compression (APPNOTE method 93).
    Zstd = 93,
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            93 => Ok(Self::Zstd),
            other => Err(other),
        }
    }
}

/// General purpose bit flags.
pub mod flags {
    /// Entry data is encrypted.
    pub const ENCRYPTED: u16 = 0x0001;
    /// Sizes and CRC follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 0x0008;
    /// File name and comment are UTF-8.
    pub const UTF8: u16 = 0x0800;
}
