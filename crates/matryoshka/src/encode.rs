//! Canonical address strings.
//!
//! One encoding pass is applied to every component: control characters,
//! space, `%` and non-ASCII bytes are percent-encoded, and a literal `!/`
//! inside a name becomes `%21/` so it cannot be mistaken for a separator.
//! Every other ASCII character is kept verbatim; `$` and `+` in particular
//! are valid literals and match entry names as written.

use std::fmt::{self, Write};
use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::address::{JAR_SCHEME, SEPARATOR};
use crate::Archive;

/// Characters escaped in address components, besides non-ASCII.
const COMPONENT: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

/// Root locator scheme for physical files.
pub(crate) const FILE_SCHEME: &str = "file:";

/// Percent-encode one address component.
///
/// ```
/// use matryoshka::encode_component;
///
/// assert_eq!(encode_component("nesting nested.jar"), "nesting%20nested.jar");
/// assert_eq!(encode_component("nesting$nested.jar"), "nesting$nested.jar");
/// assert_eq!(encode_component("nesting+nested.jar"), "nesting+nested.jar");
/// ```
pub fn encode_component(component: &str) -> String {
    let encoded = utf8_percent_encode(component, COMPONENT).to_string();
    if encoded.contains(SEPARATOR) {
        encoded.replace(SEPARATOR, "%21/")
    } else {
        encoded
    }
}

/// The encoded `file:` path of a root archive.
pub(crate) fn root_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        let text = text.strip_prefix(r"\\?\").unwrap_or(&text).replace('\\', "/");
        if text.as_bytes().get(1) == Some(&b':') {
            return encode_component(&format!("/{text}"));
        }
        return encode_component(&text);
    }
    encode_component(&text)
}

/// Write `jar:file:<root>!/<nested>!/...<path>`, or the relative form when
/// there is no root.
pub(crate) fn write_address<W: Write>(
    out: &mut W,
    root: Option<&Path>,
    nested: &[String],
    path: &str,
) -> fmt::Result {
    if let Some(root) = root {
        out.write_str(JAR_SCHEME)?;
        out.write_str(FILE_SCHEME)?;
        out.write_str(&root_path(root))?;
        out.write_str(SEPARATOR)?;
    }
    for name in nested {
        out.write_str(&encode_component(name))?;
        out.write_str(SEPARATOR)?;
    }
    out.write_str(&encode_component(path))
}

/// Build the canonical address of `inner_path` inside `archive`.
///
/// An empty `inner_path` addresses the archive itself. Parsing the result
/// and resolving it from the physical root yields `archive` (and the same
/// entry) again.
pub fn build(archive: &Archive, inner_path: &str) -> String {
    let location = archive.location();
    let mut url = String::new();
    // Writing into a String cannot fail.
    let _ = write_address(
        &mut url,
        Some(location.root()),
        location.entries(),
        inner_path,
    );
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_is_encoded() {
        assert_eq!(encode_component("nesting nested.jar"), "nesting%20nested.jar");
        assert_eq!(encode_component("a  b"), "a%20%20b");
    }

    #[test]
    fn test_dollar_and_plus_pass_through() {
        assert_eq!(encode_component("nesting$nested.jar"), "nesting$nested.jar");
        assert_eq!(encode_component("nesting+nested.jar"), "nesting+nested.jar");
        assert_eq!(encode_component("nesting-nested.jar"), "nesting-nested.jar");
    }

    #[test]
    fn test_reserved_characters() {
        assert_eq!(encode_component("100%.dat"), "100%25.dat");
        assert_eq!(encode_component("tab\there"), "tab%09here");
        assert_eq!(encode_component("bang!/slash"), "bang%21/slash");
        assert_eq!(encode_component("bang!.dat"), "bang!.dat");
        assert_eq!(encode_component("caf\u{e9}.dat"), "caf%C3%A9.dat");
    }

    #[test]
    fn test_slashes_kept() {
        assert_eq!(encode_component("d/9.dat"), "d/9.dat");
        assert_eq!(encode_component(""), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_address() {
        let mut out = String::new();
        write_address(
            &mut out,
            Some(Path::new("/tmp/my app.jar")),
            &["lib/nested.jar".to_string()],
            "3.dat",
        )
        .unwrap();
        assert_eq!(out, "jar:file:/tmp/my%20app.jar!/lib/nested.jar!/3.dat");

        let mut relative = String::new();
        write_address(&mut relative, None, &["nested.jar".to_string()], "").unwrap();
        assert_eq!(relative, "nested.jar!/");
    }
}
