//! Resolution of compound addresses to archives and entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use hashbrown::HashMap;
use matryoshka_zip::{EntryReader, ZipEntry};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::archive::canonicalize;
use crate::{Address, Archive, ArchiveOptions, Error, Result};

/// What an address resolved to.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// The address denotes an archive (an empty final path).
    Archive(Arc<Archive>),
    /// The address denotes an entry inside an archive.
    Entry(EntryHandle),
}

impl Resolved {
    /// Canonical address of the result.
    pub fn url(&self) -> String {
        match self {
            Resolved::Archive(archive) => archive.url(),
            Resolved::Entry(entry) => entry.url(),
        }
    }

    /// The archive itself, or the archive containing the entry.
    pub fn archive(&self) -> &Arc<Archive> {
        match self {
            Resolved::Archive(archive) => archive,
            Resolved::Entry(entry) => entry.archive(),
        }
    }

    /// Whether the result is an archive.
    pub fn is_archive(&self) -> bool {
        matches!(self, Resolved::Archive(_))
    }

    /// The entry, if the result is one.
    pub fn as_entry(&self) -> Option<&EntryHandle> {
        match self {
            Resolved::Entry(entry) => Some(entry),
            Resolved::Archive(_) => None,
        }
    }

    /// Convert into the archive, if the result is one.
    pub fn into_archive(self) -> Option<Arc<Archive>> {
        match self {
            Resolved::Archive(archive) => Some(archive),
            Resolved::Entry(_) => None,
        }
    }

    /// Open a stream over the entry's contents.
    ///
    /// Fails with [`Error::NotAnEntry`] for archives.
    pub fn open(&self) -> Result<EntryReader> {
        match self {
            Resolved::Entry(entry) => entry.open(),
            Resolved::Archive(archive) => Err(Error::NotAnEntry {
                address: archive.url(),
            }),
        }
    }

    /// Read the entry's contents fully.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.open()?.read_to_vec()?)
    }
}

/// An entry located inside an archive.
///
/// Holding a handle keeps the containing archive, and the bytes of every
/// archive above it, alive.
#[derive(Debug, Clone)]
pub struct EntryHandle {
    archive: Arc<Archive>,
    entry: ZipEntry,
    path: String,
}

impl EntryHandle {
    /// The archive containing the entry.
    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    /// Entry metadata.
    pub fn entry(&self) -> &ZipEntry {
        &self.entry
    }

    /// The path the entry was looked up by.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open a stream over the entry's contents.
    pub fn open(&self) -> Result<EntryReader> {
        self.archive.open_zip_entry(&self.entry)
    }

    /// Read the entry's contents fully.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.open()?.read_to_vec()?)
    }

    /// Uncompressed size in bytes.
    pub fn content_length(&self) -> u64 {
        self.entry.size()
    }

    /// Last modification time.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.entry.last_modified()
    }

    /// Canonical address of the entry.
    pub fn url(&self) -> String {
        self.archive.entry_url(&self.path)
    }
}

/// Resolves addresses, walking nested archives through their caches.
///
/// Root archives opened while resolving absolute addresses are kept in a
/// registry keyed by canonical path, so every address naming the same file
/// shares one root and therefore one tree of nested archive caches.
#[derive(Debug, Default)]
pub struct Resolver {
    options: ArchiveOptions,
    roots: Mutex<HashMap<PathBuf, Arc<Archive>>>,
}

impl Resolver {
    /// Create a resolver opening root archives with `options`.
    pub fn new(options: ArchiveOptions) -> Self {
        Self {
            options,
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Options used for root archives opened by this resolver.
    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    /// Open the root archive at `path`, reusing a registered one.
    pub fn open_root<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Archive>> {
        let root = canonicalize(path.as_ref())?;
        let mut roots = self.roots.lock();
        if let Some(archive) = roots.get(&root) {
            trace!(path = %root.display(), "root archive registry hit");
            return Ok(Arc::clone(archive));
        }

        let archive = Archive::open_with(&root, self.options)?;
        debug!(path = %root.display(), "registered root archive");
        roots.insert(root, Arc::clone(&archive));
        Ok(archive)
    }

    /// Register the root of `archive` unless its path is already known.
    ///
    /// Returns the registered root, which may be an earlier instance.
    pub fn register(&self, archive: &Arc<Archive>) -> Option<Arc<Archive>> {
        let root = archive.root()?;
        let mut roots = self.roots.lock();
        let registered = roots
            .entry(root.location().root().to_path_buf())
            .or_insert_with(|| {
                debug!(path = %root.location().root().display(), "registered root archive");
                Arc::clone(&root)
            });
        Some(Arc::clone(registered))
    }

    /// Number of registered root archives.
    pub fn root_count(&self) -> usize {
        self.roots.lock().len()
    }

    /// Parse and resolve `address` against `context`.
    pub fn resolve_str(&self, address: &str, context: &Arc<Archive>) -> Result<Resolved> {
        self.resolve(&Address::parse(address)?, context)
    }

    /// Parse and resolve an absolute address.
    pub fn resolve_url(&self, address: &str) -> Result<Resolved> {
        self.resolve_absolute(&Address::parse(address)?)
    }

    /// Resolve `address` against `context`.
    ///
    /// Relative addresses are resolved entirely inside `context`. Absolute
    /// addresses reuse `context` or one of its ancestors when it lies on the
    /// address's chain, and otherwise start from the registered root.
    pub fn resolve(&self, address: &Address, context: &Arc<Archive>) -> Result<Resolved> {
        match address.root() {
            None => walk(Arc::clone(context), address.nested(), address.path()),
            Some(root) => {
                let root = canonicalize(root)?;
                let (start, depth) = match anchor_in(context, &root, address.nested()) {
                    Some(anchor) => anchor,
                    None => (self.open_root(&root)?, 0),
                };
                walk(start, &address.nested()[depth..], address.path())
            }
        }
    }

    /// Resolve an absolute address without a context.
    pub fn resolve_absolute(&self, address: &Address) -> Result<Resolved> {
        let root = address.root().ok_or_else(|| {
            Error::malformed(
                &address.to_string(),
                "relative address resolved without a context archive",
            )
        })?;
        let start = self.open_root(root)?;
        walk(start, address.nested(), address.path())
    }
}

/// The deepest archive among `context` and its ancestors on the chain
/// `root!/nested...`, with the number of nested names it already covers.
fn anchor_in(context: &Arc<Archive>, root: &Path, nested: &[String]) -> Option<(Arc<Archive>, usize)> {
    let mut current = Some(Arc::clone(context));
    while let Some(archive) = current {
        if archive.location().is_ancestor_of(root, nested) {
            let depth = archive.location().depth();
            trace!(context = %archive.location(), "resolving from context archive");
            return Some((archive, depth));
        }
        current = archive.parent();
    }
    None
}

fn walk(mut archive: Arc<Archive>, nested: &[String], path: &str) -> Result<Resolved> {
    for name in nested {
        archive = archive.nested_archive(name)?;
    }
    if path.is_empty() {
        return Ok(Resolved::Archive(archive));
    }

    let entry = archive.require(path)?.clone();
    Ok(Resolved::Entry(EntryHandle {
        archive,
        entry,
        path: path.to_string(),
    }))
}
