//! Origin sources and metadata filters.
//!
//! The resolver never fetches documents itself. It asks an [`OriginSource`]
//! for the document matching a query, passes the result through an optional
//! [`MetadataFilter`] (validation, signature checks, pruning), and caches
//! what comes out.
//!
//! # Sources
//!
//! - [`LocalOriginSource`]: documents from a [`LoadSaveManager`](crate::persist::LoadSaveManager).
//! - [`HttpOriginSource`]: documents over HTTP (requires the `http` feature).
//! - [`RetryingOriginSource`]: decorator retrying transient failures.

mod digest;
#[cfg(feature = "http")]
mod http;
mod local;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;

pub use digest::EntityIdDigestGenerator;
#[cfg(feature = "http")]
pub use http::{DEFAULT_CONTENT_TYPES, HttpOriginSource, RequestUrlBuilder};
pub use local::LocalOriginSource;
pub use retry::{RetryConfig, RetryingOriginSource};

use crate::Result;
use crate::criteria::CriteriaSet;
use crate::types::EntityDescriptor;

/// Where dynamically resolved documents come from.
#[async_trait]
pub trait OriginSource: Send + Sync {
    /// Name for logging and metrics.
    fn name(&self) -> &str;

    /// Fetch the document matching `criteria`.
    ///
    /// `Ok(None)` means there is nothing new: no such entity, or the origin
    /// reported the document as not modified.
    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>>;
}

/// Processing applied to each fetched document before it is cached.
///
/// Returning `Ok(None)` rejects the document as a whole.
pub trait MetadataFilter: Send + Sync {
    fn filter(&self, descriptor: EntityDescriptor) -> Result<Option<EntityDescriptor>>;
}

impl<F> MetadataFilter for F
where
    F: Fn(EntityDescriptor) -> Result<Option<EntityDescriptor>> + Send + Sync,
{
    fn filter(&self, descriptor: EntityDescriptor) -> Result<Option<EntityDescriptor>> {
        self(descriptor)
    }
}

/// Runs filters in order, stopping at the first rejection or error.
#[derive(Default, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn MetadataFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter.
    pub fn then(mut self, filter: impl MetadataFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl MetadataFilter for FilterChain {
    fn filter(&self, descriptor: EntityDescriptor) -> Result<Option<EntityDescriptor>> {
        let mut current = descriptor;
        for filter in &self.filters {
            match filter.filter(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeimdallError;
    use crate::types::{RoleDescriptor, RoleType};

    fn strip_roles(mut descriptor: EntityDescriptor) -> Result<Option<EntityDescriptor>> {
        descriptor.roles.clear();
        Ok(Some(descriptor))
    }

    #[test]
    fn chain_applies_filters_in_order() {
        let chain = FilterChain::new()
            .then(strip_roles)
            .then(|d: EntityDescriptor| -> Result<Option<EntityDescriptor>> {
                Ok(d.roles.is_empty().then_some(d))
            });
        let descriptor = EntityDescriptor::new("urn:a").role(RoleDescriptor::new(RoleType::SpSso));
        let filtered = chain.filter(descriptor).unwrap().unwrap();
        assert!(filtered.roles.is_empty());
    }

    #[test]
    fn chain_stops_at_rejection() {
        let chain = FilterChain::new()
            .then(|_: EntityDescriptor| -> Result<Option<EntityDescriptor>> { Ok(None) })
            .then(|_: EntityDescriptor| -> Result<Option<EntityDescriptor>> {
                Err(HeimdallError::Filter("unreachable".into()))
            });
        assert_eq!(chain.filter(EntityDescriptor::new("urn:a")).unwrap(), None);
    }

    #[test]
    fn chain_propagates_errors() {
        let chain = FilterChain::new().then(|_: EntityDescriptor| -> Result<Option<EntityDescriptor>> {
            Err(HeimdallError::Filter("bad signature".into()))
        });
        assert!(matches!(
            chain.filter(EntityDescriptor::new("urn:a")),
            Err(HeimdallError::Filter(_))
        ));
    }

    #[test]
    fn empty_chain_passes_through() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        let d = EntityDescriptor::new("urn:a");
        assert_eq!(chain.filter(d.clone()).unwrap(), Some(d));
    }
}
