//! ZIP entry table for Matryoshka.
//!
//! This crate is the archive layer that nested-archive resolution builds on:
//!
//! - ZIP and ZIP64 central directory parsing, including archives with
//!   leading bytes such as a prepended launch script
//! - Stored, DEFLATE and Zstandard entries, streamed lazily with CRC-32
//!   verification
//! - Random-access [`DataSource`]s (memory-mapped, positional file reads,
//!   in-memory buffers and zero-copy windows into other sources)
//! - Interruption-safe reads: interrupted reads are reissued rather than
//!   surfaced, and the caller's interruption flag is never touched
//!
//! # Example
//!
//! ```no_run
//! use matryoshka_zip::{IoMode, ZipArchive};
//!
//! let archive = ZipArchive::open("app.jar", IoMode::Mapped)?;
//!
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name(), entry.size());
//! }
//!
//! // A stored entry can itself be opened as an archive without copying.
//! if let Some(entry) = archive.get("lib/nested.jar") {
//!     let nested = ZipArchive::from_source(archive.entry_source(entry, true)?)?;
//!     let data = nested.read_by_name("3.dat")?;
//! }
//! # Ok::<(), matryoshka_zip::Error>(())
//! ```

mod archive;
mod decompress;
mod entry;
mod error;
pub mod format;
pub mod source;

pub use archive::ZipArchive;
pub use decompress::EntryReader;
pub use entry::ZipEntry;
pub use error::{Error, Result};
pub use format::CompressionMethod;
pub use source::{DataSource, IoMode};
