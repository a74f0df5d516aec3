//! Error types for the ZIP crate.

use thiserror::Error;

/// Errors that can occur when working with ZIP archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] matryoshka_common::Error),

    /// Invalid ZIP magic bytes.
    #[error("invalid ZIP signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Could not find the end of central directory record.
    #[error("could not find end of central directory record")]
    EocdNotFound,

    /// ZIP64 record not found when expected.
    #[error("ZIP64 end of central directory not found")]
    Zip64EocdNotFound,

    /// A record points outside the archive.
    #[error("{what} out of bounds: offset {offset}, length {length}, archive size {size}")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        length: u64,
        size: u64,
    },

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Entry is encrypted.
    #[error("entry is encrypted: {0}")]
    Encrypted(String),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

impl Error {
    /// Whether the error means the bytes are not a well-formed ZIP container.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSignature { .. }
                | Error::EocdNotFound
                | Error::Zip64EocdNotFound
                | Error::OutOfBounds { .. }
                | Error::Common(_)
        )
    }
}

/// Result type for ZIP operations.
pub type Result<T> = std::result::Result<T, Error>;
