//! Classpath-style resource lookup over an ordered list of roots.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::{Address, Archive, Error, Resolved, Resolver, Result};

/// Looks up resource names across an ordered list of root archives.
///
/// Roots may be physical files or archives nested at any depth. Relative
/// names are tried against each root in order; absolute names are resolved
/// once.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use matryoshka::{ArchiveOptions, ResourceLoader, Resolver};
///
/// let resolver = Arc::new(Resolver::new(ArchiveOptions::default()));
/// let loader = ResourceLoader::new(
///     resolver,
///     ["jar:file:app.jar!/", "jar:file:app.jar!/lib/nested.jar!/"],
/// )?;
///
/// if let Some(resource) = loader.find_resource("3.dat")? {
///     println!("{} -> {:?}", resource.url(), resource.read_to_vec()?);
/// }
/// # Ok::<(), matryoshka::Error>(())
/// ```
#[derive(Debug)]
pub struct ResourceLoader {
    resolver: Arc<Resolver>,
    roots: Vec<Arc<Archive>>,
}

impl ResourceLoader {
    /// Resolve every root address; each must denote an archive.
    pub fn new<I, S>(resolver: Arc<Resolver>, roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roots = roots
            .into_iter()
            .map(|root| {
                let text = root.as_ref();
                match resolver.resolve_url(text)? {
                    Resolved::Archive(archive) => Ok(archive),
                    Resolved::Entry(_) => Err(Error::malformed(
                        text,
                        "root address denotes an entry, not an archive",
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { resolver, roots })
    }

    /// Use archives that are already open as roots.
    pub fn from_archives(resolver: Arc<Resolver>, roots: Vec<Arc<Archive>>) -> Self {
        for root in &roots {
            resolver.register(root);
        }
        Self { resolver, roots }
    }

    /// The resolver used for lookups.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Roots in lookup order.
    pub fn roots(&self) -> &[Arc<Archive>] {
        &self.roots
    }

    /// The first root under which `name` resolves.
    ///
    /// The empty name denotes a root itself. Returns `Ok(None)` when nothing
    /// matches. A root where resolution fails for any other reason, such as
    /// an entry that is not an archive, is skipped; malformed names are
    /// errors.
    pub fn find_resource(&self, name: &str) -> Result<Option<Resolved>> {
        Ok(self.lookup(name, true)?.into_iter().next())
    }

    /// Every root under which `name` resolves, in root order.
    pub fn find_all_resources(&self, name: &str) -> Result<Vec<Resolved>> {
        self.lookup(name, false)
    }

    fn lookup(&self, name: &str, first_only: bool) -> Result<Vec<Resolved>> {
        let address = Address::parse(name)?;

        if let Some(root) = address.root() {
            let context = match root.canonicalize() {
                Ok(root) => self.roots.iter().find(|r| r.location().root() == root),
                Err(_) => return Ok(Vec::new()),
            };
            let resolved = match context {
                Some(context) => self.resolver.resolve(&address, context),
                None => self.resolver.resolve_absolute(&address),
            };
            return miss_as_none(name, resolved).map(|r| r.into_iter().collect());
        }

        let mut found = Vec::new();
        for root in &self.roots {
            if address.is_archive() && address.nested().is_empty() && root.is_empty() {
                continue;
            }
            if let Some(resolved) = miss_as_none(name, self.resolver.resolve(&address, root))? {
                trace!(name, root = %root.location(), "resource found");
                found.push(resolved);
                if first_only {
                    break;
                }
            }
        }
        Ok(found)
    }
}

/// Only a malformed address fails a lookup; any other failure means the
/// name does not resolve under that root.
fn miss_as_none(name: &str, resolved: Result<Resolved>) -> Result<Option<Resolved>> {
    match resolved {
        Ok(resolved) => Ok(Some(resolved)),
        Err(err @ Error::MalformedAddress { .. }) => Err(err),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => {
            debug!(name, error = %err, "resource lookup failed under root");
            Ok(None)
        }
    }
}
