//! Entity ID digest keys.

use sha1::{Digest, Sha1};

use crate::criteria::CriteriaSet;

/// Derives a storage or URL key from an entity ID: the lower-hex SHA-1 of the
/// trimmed ID, optionally wrapped as `{prefix}{separator}{digest}{separator}{suffix}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityIdDigestGenerator {
    prefix: Option<String>,
    suffix: Option<String>,
    separator: Option<String>,
}

impl EntityIdDigestGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Placed between the prefix, digest and suffix.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Key for `entity_id`, or `None` if it is blank.
    pub fn generate(&self, entity_id: &str) -> Option<String> {
        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return None;
        }
        let digest = hex::encode(Sha1::digest(entity_id.as_bytes()));
        let separator = self.separator.as_deref().unwrap_or("");

        let mut key = String::new();
        if let Some(prefix) = &self.prefix {
            key.push_str(prefix);
            key.push_str(separator);
        }
        key.push_str(&digest);
        if let Some(suffix) = &self.suffix {
            key.push_str(separator);
            key.push_str(suffix);
        }
        Some(key)
    }

    /// Key for the entity ID in `criteria`, if any.
    pub fn generate_for(&self, criteria: &CriteriaSet) -> Option<String> {
        self.generate(criteria.entity_id()?)
    }
}
