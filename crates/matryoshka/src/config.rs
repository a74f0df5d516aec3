//! Options applied when opening archives.

use matryoshka_zip::IoMode;

/// Options for opening root archives.
///
/// Options given to a root archive are inherited by every nested archive
/// materialized beneath it.
///
/// # Example
///
/// ```
/// use matryoshka::{ArchiveOptions, IoMode};
///
/// let options = ArchiveOptions::new()
///     .with_io_mode(IoMode::Positional)
///     .with_verify_checksums(false);
///
/// assert_eq!(options.io_mode, IoMode::Positional);
/// assert!(!options.verify_checksums);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// How root archive files are read.
    ///
    /// Default: memory-mapped.
    pub io_mode: IoMode,

    /// Check size and CRC-32 of every entry at end of stream.
    ///
    /// Default: true.
    pub verify_checksums: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            io_mode: IoMode::Mapped,
            verify_checksums: true,
        }
    }
}

impl ArchiveOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how root archive files are read.
    #[must_use]
    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    /// Enable or disable checksum verification.
    #[must_use]
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}
