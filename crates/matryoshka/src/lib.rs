//! Matryoshka - nested archive resolution.
//!
//! Reads entries of archives that are themselves entries of other archives,
//! at any depth, without extracting anything to disk. Inner archives are
//! addressed with compound addresses such as
//! `jar:file:/apps/app.jar!/lib/nested.jar!/3.dat`.
//!
//! # Crates
//!
//! - [`matryoshka_common`] - Binary reading and the per-thread interruption flag
//! - [`matryoshka_zip`] - ZIP entry table and interruption-safe entry streams
//!
//! # Example
//!
//! ```no_run
//! use matryoshka::prelude::*;
//!
//! let resolver = Resolver::new(ArchiveOptions::default());
//!
//! let entry = resolver.resolve_url("jar:file:app.jar!/lib/nested.jar!/3.dat")?;
//! println!("{}: {:?}", entry.url(), entry.read_to_vec()?);
//!
//! // Relative lookups run against any archive in the chain.
//! let nested = resolver.resolve_url("jar:file:app.jar!/lib/nested.jar!/")?;
//! let sibling = resolver.resolve_str("4.dat", nested.archive())?;
//! # Ok::<(), matryoshka::Error>(())
//! ```

mod address;
mod archive;
mod cache;
mod config;
mod encode;
mod error;
mod loader;
mod resolver;

// Re-export sub-crates
pub use matryoshka_common as common;
pub use matryoshka_zip as zip;

pub use address::{Address, JAR_SCHEME, SEPARATOR};
pub use archive::{Archive, ArchiveLocation};
pub use cache::NestedArchiveCache;
pub use config::ArchiveOptions;
pub use encode::{build, encode_component};
pub use error::{Error, Result};
pub use loader::ResourceLoader;
pub use resolver::{EntryHandle, Resolved, Resolver};

pub use matryoshka_common::interrupt;
pub use matryoshka_zip::{EntryReader, IoMode, ZipEntry};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Address, Archive, ArchiveOptions, EntryHandle, IoMode, Resolved, Resolver,
        ResourceLoader,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
