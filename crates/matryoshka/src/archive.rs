//! Archives opened from disk or materialized from a parent's entry.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use matryoshka_zip::{source, CompressionMethod, EntryReader, ZipArchive, ZipEntry};
use tracing::{debug, warn};

use crate::cache::NestedArchiveCache;
use crate::encode::{self, write_address};
use crate::{ArchiveOptions, Error, Result};

/// Where an archive lives: a physical root file plus the chain of entry
/// names leading down to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveLocation {
    root: PathBuf,
    entries: Vec<String>,
}

impl ArchiveLocation {
    fn root_file(root: PathBuf) -> Self {
        Self {
            root,
            entries: Vec::new(),
        }
    }

    fn child(&self, name: &str) -> Self {
        let mut entries = self.entries.clone();
        entries.push(name.to_string());
        Self {
            root: self.root.clone(),
            entries,
        }
    }

    /// Canonical path of the physical root archive.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry names from the root down to this archive.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Nesting depth; zero for a physical file.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Whether this location is `root` or lies on the way down `nested`.
    pub fn is_ancestor_of(&self, root: &Path, nested: &[String]) -> bool {
        self.root == root
            && self.entries.len() <= nested.len()
            && self.entries[..] == nested[..self.entries.len()]
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_address(f, Some(&self.root), &self.entries, "")
    }
}

/// An opened archive, either a physical file or a nested archive.
///
/// Archives are handed out as `Arc<Archive>`. Each archive owns the cache of
/// its direct children; a child keeps the parent's bytes alive through its
/// data source and refers back to the parent archive only weakly, so a root
/// and its subtree are released together once no handle to them is left.
pub struct Archive {
    location: ArchiveLocation,
    zip: ZipArchive,
    options: ArchiveOptions,
    parent: Weak<Archive>,
    children: NestedArchiveCache,
}

impl Archive {
    /// Open a physical archive with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        Self::open_with(path, ArchiveOptions::default())
    }

    /// Open a physical archive.
    ///
    /// The path is canonicalized and becomes the root of the archive's
    /// location.
    pub fn open_with<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Arc<Self>> {
        let root = canonicalize(path.as_ref())?;
        let source = source::open_file(&root, options.io_mode).map_err(|e| Error::FileNotFound {
            path: root.clone(),
            source: e,
        })?;
        let zip = ZipArchive::from_source(source)
            .map_err(|e| Error::from_zip(root.display().to_string(), e))?;

        debug!(
            path = %root.display(),
            entries = zip.len(),
            prefix = zip.prefix_len(),
            "opened root archive"
        );

        Ok(Arc::new(Self::new(
            ArchiveLocation::root_file(root),
            zip,
            options,
            Weak::new(),
        )))
    }

    fn new(
        location: ArchiveLocation,
        zip: ZipArchive,
        options: ArchiveOptions,
        parent: Weak<Archive>,
    ) -> Self {
        Self {
            location,
            zip,
            options,
            parent,
            children: NestedArchiveCache::new(),
        }
    }

    /// Identity of this archive.
    #[inline]
    pub fn location(&self) -> &ArchiveLocation {
        &self.location
    }

    /// Options inherited from the root.
    #[inline]
    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    /// The parsed entry table.
    #[inline]
    pub fn zip(&self) -> &ZipArchive {
        &self.zip
    }

    /// Entries in central directory order.
    #[inline]
    pub fn entries(&self) -> &[ZipEntry] {
        self.zip.entries()
    }

    /// Check whether the entry table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }

    /// Look up an entry, falling back to the directory entry `name/`.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.zip.find(name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&ZipEntry> {
        self.entry(name).ok_or_else(|| Error::EntryNotFound {
            archive: self.location.to_string(),
            name: name.to_string(),
        })
    }

    /// The parent archive, if this is a nested archive whose parent is still
    /// alive.
    pub fn parent(&self) -> Option<Arc<Archive>> {
        self.parent.upgrade()
    }

    /// The physical root archive of this archive's chain.
    ///
    /// Returns `None` if an ancestor has already been released.
    pub fn root(self: &Arc<Self>) -> Option<Arc<Archive>> {
        let mut current = Arc::clone(self);
        while current.location.depth() > 0 {
            current = current.parent()?;
        }
        Some(current)
    }

    /// Nested archives materialized beneath this archive.
    pub fn nested_cache(&self) -> &NestedArchiveCache {
        &self.children
    }

    /// Open the entry `name` as a nested archive.
    ///
    /// The name must match exactly. Repeated calls return the same instance.
    pub fn nested_archive(self: &Arc<Self>, name: &str) -> Result<Arc<Archive>> {
        self.children
            .get_or_try_insert_with(name, || self.materialize(name))
    }

    fn materialize(self: &Arc<Self>, name: &str) -> Result<Archive> {
        let entry = self.zip.get(name).ok_or_else(|| Error::EntryNotFound {
            archive: self.location.to_string(),
            name: name.to_string(),
        })?;
        let location = self.location.child(name);

        if entry.compression_method() != Ok(CompressionMethod::Store) {
            warn!(
                archive = %self.location,
                name,
                size = entry.size(),
                "nested archive is compressed, inflating into memory"
            );
        }

        let source = self
            .zip
            .entry_source(entry, self.options.verify_checksums)
            .map_err(|e| Error::from_zip(location.to_string(), e))?;
        let zip = ZipArchive::from_source(source)
            .map_err(|e| Error::from_zip(location.to_string(), e))?;

        debug!(
            location = %location,
            entries = zip.len(),
            "materialized nested archive"
        );

        Ok(Self::new(location, zip, self.options, Arc::downgrade(self)))
    }

    /// Open a stream over an entry's contents.
    pub fn open_entry(&self, name: &str) -> Result<EntryReader> {
        let entry = self.require(name)?;
        self.open_zip_entry(entry)
    }

    pub(crate) fn open_zip_entry(&self, entry: &ZipEntry) -> Result<EntryReader> {
        Ok(self.zip.open_stream(entry, self.options.verify_checksums)?)
    }

    /// Read an entry's contents fully.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.open_entry(name)?.read_to_vec()?)
    }

    /// Uncompressed size of an entry.
    pub fn content_length(&self, name: &str) -> Result<u64> {
        Ok(self.require(name)?.size())
    }

    /// Last modification time of an entry.
    pub fn last_modified(&self, name: &str) -> Result<Option<SystemTime>> {
        Ok(self.require(name)?.last_modified())
    }

    /// Canonical address of this archive.
    pub fn url(&self) -> String {
        encode::build(self, "")
    }

    /// Canonical address of `path` inside this archive.
    pub fn entry_url(&self, path: &str) -> String {
        encode::build(self, path)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("location", &self.location.to_string())
            .field("entries", &self.zip.len())
            .field("nested", &self.children)
            .finish()
    }
}

pub(crate) fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| Error::FileNotFound {
        path: path.to_path_buf(),
        source,
    })
}
