//! Error types for nested archive resolution.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing addresses, opening archives and resolving
/// entries.
#[derive(Debug, Error)]
pub enum Error {
    /// The address cannot be split into a root locator and segments.
    #[error("malformed address {address:?}: {reason}")]
    MalformedAddress { address: String, reason: String },

    /// Bytes expected to hold an archive fail container validation.
    #[error("{name} is not an archive: {source}")]
    NotAnArchive {
        name: String,
        source: matryoshka_zip::Error,
    },

    /// A nested segment or final path does not exist.
    #[error("entry {name:?} not found in {archive}")]
    EntryNotFound { archive: String, name: String },

    /// The physical root archive cannot be opened.
    #[error("cannot open {}: {source}", path.display())]
    FileNotFound { path: PathBuf, source: io::Error },

    /// A stream was requested for an address that denotes an archive.
    #[error("{address} denotes an archive, not an entry")]
    NotAnEntry { address: String },

    /// I/O error while reading entry data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Archive layer error that is not a format violation.
    #[error("archive error: {0}")]
    Zip(#[from] matryoshka_zip::Error),
}

impl Error {
    /// Whether the error is the negative outcome of a lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::EntryNotFound { .. } | Error::FileNotFound { .. }
        )
    }

    pub(crate) fn malformed(address: &str, reason: impl Into<String>) -> Self {
        Error::MalformedAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify an archive layer failure for the archive named `name`.
    pub(crate) fn from_zip(name: impl Into<String>, err: matryoshka_zip::Error) -> Self {
        if err.is_format_error() {
            Error::NotAnArchive {
                name: name.into(),
                source: err,
            }
        } else {
            Error::Zip(err)
        }
    }
}

/// Result type for nested archive operations.
pub type Result<T> = std::result::Result<T, Error>;
