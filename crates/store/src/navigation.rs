//! Canonical navigation keys.
//!
//! Pages are addressed by a key derived from their display name, unique among
//! live pages. Files are addressed by a key unique within their page. Page
//! names may carry a namespace prefix separated by `::`, e.g.
//! `Help::Getting Started` lives in the `Help` namespace and navigates to
//! `help::getting-started`.

use crate::error::{ErrorKind, Result};
use rslug::slugify;

const NAMESPACE_SEPARATOR: &str = "::";

/// Navigation key for a page name.
pub fn page_key(name: &str) -> Result<String> {
    let segments = name
        .split(NAMESPACE_SEPARATOR)
        .map(|segment| slugify!(segment.trim()))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.is_empty() {
        exn::bail!(ErrorKind::Invariant("page name has no navigable characters"));
    }
    Ok(segments.join(NAMESPACE_SEPARATOR))
}

/// Namespace portion of a page name (everything before the last `::`), or an
/// empty string for pages in the root namespace.
pub fn namespace_of(name: &str) -> String {
    name.rsplit_once(NAMESPACE_SEPARATOR)
        .map(|(namespace, _)| namespace.trim().to_string())
        .unwrap_or_default()
}

/// Navigation key for an attachment name: the slugified stem followed by the
/// lower-cased extension.
pub fn file_key(name: &str) -> Result<String> {
    let name = name.trim();
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    };
    let stem = slugify!(stem);
    if stem.is_empty() {
        exn::bail!(ErrorKind::Invariant("file name has no navigable characters"));
    }
    let extension = extension
        .map(|e| e.chars().filter(char::is_ascii_alphanumeric).collect::<String>().to_ascii_lowercase())
        .filter(|e| !e.is_empty());
    Ok(match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Home", "home")]
    #[case("Getting Started", "getting-started")]
    #[case("Help::Getting Started", "help::getting-started")]
    #[case("  Help :: Editing Pages ", "help::editing-pages")]
    #[case("Help::::Orphans", "help::orphans")]
    fn test_page_key(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(page_key(name).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("::")]
    fn test_page_key_rejects_empty(#[case] name: &str) {
        let err = page_key(name).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invariant(_)));
    }

    #[rstest]
    #[case("Home", "")]
    #[case("Help::Getting Started", "Help")]
    #[case("Wiki::Help::Getting Started", "Wiki::Help")]
    fn test_namespace_of(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(namespace_of(name), expected);
    }

    #[rstest]
    #[case("img.png", "img.png")]
    #[case("My Photo.PNG", "my-photo.png")]
    #[case("README", "readme")]
    #[case(".htaccess", "htaccess")]
    fn test_file_key(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(file_key(name).unwrap(), expected);
    }

    #[test]
    fn test_file_key_rejects_empty() {
        assert!(file_key("...").is_err());
    }
}
