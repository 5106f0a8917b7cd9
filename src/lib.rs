//! Heimdall - dynamic resolution cache for federation entity metadata
//!
//! This crate resolves the metadata documents that describe federation
//! entities (their endpoints, roles and validity) by entity ID or by
//! secondary attributes such as an endpoint location or an artifact source
//! ID. Documents are fetched lazily from an origin source, cached in
//! memory, refreshed before they expire, evicted when expired or idle, and
//! optionally written through to a persistent store that seeds the cache on
//! the next start.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use heimdall::criteria::{CriteriaSet, EntityIdCriterion};
//! use heimdall::index::{ArtifactIndex, EndpointIndex};
//! use heimdall::source::{HttpOriginSource, RequestUrlBuilder};
//! use heimdall::DynamicMetadataResolver;
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let origin = HttpOriginSource::new(RequestUrlBuilder::Template(
//!         "https://mdq.example.org/entities/{sha1}".into(),
//!     ))?;
//!
//!     let resolver = DynamicMetadataResolver::builder()
//!         .origin(Arc::new(origin))
//!         .index(Arc::new(EndpointIndex::new()))
//!         .index(Arc::new(ArtifactIndex::new()))
//!         .build()
//!         .await?;
//!
//!     let criteria = CriteriaSet::new().with(EntityIdCriterion::new("https://idp.example.org"));
//!     for descriptor in resolver.resolve(&criteria).await? {
//!         println!("{} has {} roles", descriptor.entity_id, descriptor.roles.len());
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(feature = "cli")]
pub mod config;
pub mod criteria;
pub mod error;
pub mod index;
pub mod persist;
pub mod resolver;
pub mod source;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{HeimdallError, Result};
pub use resolver::{DynamicMetadataResolver, DynamicResolverBuilder, ExpirationPolicy, ResolverConfig};
pub use version::{GIT_BRANCH, GIT_SHA, PKG_VERSION, git_dirty, version_string};

pub use criteria::CriteriaSet;
pub use types::{Artifact, Endpoint, EndpointType, EntityDescriptor, RoleDescriptor, RoleType};
