//! Compound address parsing.
//!
//! An absolute address names a physical root archive followed by zero or
//! more nested archive entries and a final path:
//!
//! ```text
//! jar:file:/apps/app.jar!/lib/nested.jar!/3.dat
//! ^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^ ^^^^^
//!  root locator            nested entry   final path
//! ```
//!
//! A relative address has no root locator and is resolved against a context
//! archive: `lib/nested.jar!/3.dat`. Every component is percent-decoded
//! independently after splitting on `!/`, so an encoded `%21/` inside a name
//! never acts as a separator.

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::encode::{self, FILE_SCHEME};
use crate::{Error, Result};

/// Separator between nesting levels.
pub const SEPARATOR: &str = "!/";

/// Scheme prefix that makes an address absolute.
pub const JAR_SCHEME: &str = "jar:";

/// A parsed compound address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Root archive path; `None` for relative addresses.
    root: Option<PathBuf>,
    /// Decoded names of nested archive entries, outermost first.
    nested: Vec<String>,
    /// Decoded path inside the innermost archive; empty for the archive itself.
    path: String,
}

impl Address {
    /// Parse an absolute or relative address.
    pub fn parse(address: &str) -> Result<Self> {
        match address.strip_prefix(JAR_SCHEME) {
            Some(rest) => Self::parse_absolute(address, rest),
            None => {
                let rest = address.strip_prefix('/').unwrap_or(address);
                let (nested, path) = split_segments(address, rest)?;
                Ok(Self {
                    root: None,
                    nested,
                    path,
                })
            }
        }
    }

    fn parse_absolute(address: &str, rest: &str) -> Result<Self> {
        let locator = rest
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| Error::malformed(address, "only file: root locators are supported"))?;
        let (root, segments) = locator
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::malformed(address, "missing `!/` after the root locator"))?;

        let root = collapse_slashes(root);
        if root.is_empty() {
            return Err(Error::malformed(address, "empty root path"));
        }
        let root = file_path(&decode(address, root)?);

        let (nested, path) = split_segments(address, segments)?;
        Ok(Self {
            root: Some(root),
            nested,
            path,
        })
    }

    /// An absolute address.
    pub fn absolute(root: impl Into<PathBuf>, nested: Vec<String>, path: impl Into<String>) -> Self {
        Self {
            root: Some(root.into()),
            nested,
            path: path.into(),
        }
    }

    /// A relative address.
    pub fn relative(nested: Vec<String>, path: impl Into<String>) -> Self {
        Self {
            root: None,
            nested,
            path: path.into(),
        }
    }

    /// Whether the address names its own root archive.
    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    /// Path of the root archive, as written.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Nested archive entry names, outermost first.
    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    /// Path inside the innermost archive.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the address denotes an archive rather than an entry.
    pub fn is_archive(&self) -> bool {
        self.path.is_empty()
    }

    /// Resolve `reference` against this address.
    ///
    /// An absolute `reference` replaces the base. One starting with `/` is
    /// taken from the root of the innermost archive; anything else replaces
    /// the last path segment. `.` and `..` are then normalised within the
    /// final path and never climb out of the innermost archive.
    ///
    /// ```
    /// use matryoshka::Address;
    ///
    /// let base = Address::parse("jar:file:/a.jar!/nested.jar!/d/1.dat").unwrap();
    /// assert_eq!(base.merge("/3.dat").unwrap().path(), "3.dat");
    /// assert_eq!(base.merge("2.dat").unwrap().path(), "d/2.dat");
    /// assert_eq!(base.merge("../4.dat").unwrap().path(), "4.dat");
    /// ```
    pub fn merge(&self, reference: &str) -> Result<Address> {
        if reference.starts_with(JAR_SCHEME) {
            return Self::parse(reference);
        }

        let base = self.to_string();
        let joined = if reference.starts_with('/') {
            match base.rfind(SEPARATOR) {
                Some(i) => format!("{}{}", &base[..=i], reference),
                None => reference.to_string(),
            }
        } else {
            match base.rfind('/') {
                Some(i) => format!("{}{}", &base[..=i], reference),
                None => reference.to_string(),
            }
        };

        let mut merged = Self::parse(&joined)?;
        merged.path = normalize(&merged.path);
        Ok(merged)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode::write_address(f, self.root.as_deref(), &self.nested, &self.path)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `a!/b!/path` into decoded nested names and the final path.
fn split_segments(address: &str, segments: &str) -> Result<(Vec<String>, String)> {
    let mut parts: Vec<&str> = segments.split(SEPARATOR).collect();
    let path = parts.pop().unwrap_or_default();

    let nested = parts
        .into_iter()
        .map(|name| {
            if name.is_empty() {
                Err(Error::malformed(address, "empty nested entry name"))
            } else {
                decode(address, name)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((nested, decode(address, path)?))
}

fn decode(address: &str, component: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::malformed(address, "component is not valid UTF-8 once decoded"))
}

/// `//host-less/path` and `///path` both mean `/path`.
fn collapse_slashes(root: &str) -> &str {
    if root.starts_with("//") {
        &root[root.len() - root.trim_start_matches('/').len() - 1..]
    } else {
        root
    }
}

fn file_path(decoded: &str) -> PathBuf {
    if cfg!(windows) {
        let bytes = decoded.as_bytes();
        if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
            return PathBuf::from(&decoded[1..]);
        }
    }
    PathBuf::from(decoded)
}

/// Remove `.` and `..` segments from a slash-separated path.
fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
        if i == last && matches!(*segment, "." | "..") {
            out.push("");
        }
    }

    out.join("/")
}
