//! Helpers for image references and catalog URLs.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Matches a trailing `:<tag>` on an image reference. A registry port
/// (`host:5000/name`) never matches because the tag may not contain `/`.
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u):(\w[\w.-]{0,127})$").expect("tag pattern is a valid regex")
});

/// Returns true if the reference carries an explicit tag.
pub fn has_tag(reference: &str) -> bool {
    TAG_PATTERN.is_match(reference)
}

/// Returns the tag of a reference, without the leading `:`.
pub fn tag_of(reference: &str) -> Option<&str> {
    TAG_PATTERN
        .captures(reference)
        .and_then(|captures| captures.get(1))
        .map(|tag| tag.as_str())
}

/// Removes a trailing tag, leaving the bare repository name.
pub fn strip_tag(reference: &str) -> &str {
    match TAG_PATTERN.find(reference) {
        Some(m) => &reference[..m.start()],
        None => reference,
    }
}

/// Resolves `path` against `base` using URL reference resolution.
///
/// An absolute path such as `/images` replaces the path of `base`, and a
/// relative one replaces its last segment.
pub fn join_url(base: &str, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(base)?.join(path)
}
