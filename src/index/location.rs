//! Location canonicalization for index keys.
//!
//! Two spellings of the same URL must produce equal keys, so locations are
//! reduced to scheme, host, port and path before comparison. Locations that
//! do not parse as hierarchical URLs fall back to a lowercase comparison.

use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;
use url::Url;

/// A location value with canonical equality and hashing.
///
/// Equality between a canonical and a fallback key compares both raw values
/// lowercased. Hashing uses the canonical form only; URL parse failure does
/// not depend on letter case, so two raw values that differ only in case
/// always land on the same side and mixed pairs never compare equal in
/// practice.
#[derive(Clone)]
pub struct LocationKey {
    raw: String,
    canonical: String,
    fallback: bool,
}

impl LocationKey {
    pub fn new(location: &str) -> Self {
        let raw = location.trim().to_string();
        match canonicalize(&raw) {
            Some(canonical) => Self {
                raw,
                canonical,
                fallback: false,
            },
            None => {
                debug!(location = %raw, "could not canonicalize location, using lowercase fallback");
                Self {
                    canonical: raw.to_lowercase(),
                    raw,
                    fallback: true,
                }
            }
        }
    }

    /// Location as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Whether the lowercase fallback was used.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl PartialEq for LocationKey {
    fn eq(&self, other: &Self) -> bool {
        if self.fallback == other.fallback {
            self.canonical == other.canonical
        } else {
            self.raw.to_lowercase() == other.raw.to_lowercase()
        }
    }
}

impl Eq for LocationKey {}

impl Hash for LocationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationKey")
            .field("raw", &self.raw)
            .field("canonical", &self.canonical)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Reduce a URL to lowercase scheme and host, non-default port, and path.
///
/// Userinfo, query and fragment are removed. Returns `None` for anything
/// that is not an absolute URL with a host.
pub fn canonicalize(location: &str) -> Option<String> {
    let mut url = Url::parse(location).ok()?;
    if !url.has_host() || url.cannot_be_a_base() {
        return None;
    }
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);

    // Special schemes are already case-folded by the parser; others are not.
    if let Some(url::Host::Domain(domain)) = url.host() {
        let lowered = domain.to_ascii_lowercase();
        if lowered != domain {
            url.set_host(Some(&lowered)).ok()?;
        }
    }
    Some(url.to_string())
}

/// The location plus every path-trimmed prefix down to the bare origin.
///
/// `https://h/a/b` yields `https://h/a/b`, `https://h/a/`, `https://h/` and
/// `https://h`. Unparseable locations yield only themselves.
pub fn starts_with_variants(location: &str) -> Vec<String> {
    let mut variants = vec![location.to_string()];
    let mut url = match Url::parse(location) {
        Ok(url) if url.has_host() && !url.cannot_be_a_base() => url,
        _ => {
            debug!(location, "could not parse URL, will not generate path segment variants");
            return variants;
        }
    };

    let mut current = trim_path_segment(url.path());
    while let Some(path) = current {
        url.set_path(&path);
        variants.push(url.to_string());
        current = trim_path_segment(&path);
    }
    variants.push(url[..url::Position::BeforePath].to_string());
    variants
}

/// Remove the last path segment, keeping the trailing slash.
///
/// `/a/b/c` becomes `/a/b/`, `/a/b/` becomes `/a/`, and `/` has no parent.
pub fn trim_path_segment(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() || path == "/" {
        return None;
    }
    let without_trailing = path.strip_suffix('/').unwrap_or(path);
    let idx = without_trailing.rfind('/')?;
    Some(without_trailing[..=idx].to_string())
}
