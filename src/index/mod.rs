//! Secondary indexes.
//!
//! Entities are stored by entity ID. Secondary indexes let a query find them
//! by other attributes, such as an endpoint location or an artifact source
//! ID, without the caller knowing the entity ID up front.
//!
//! # Architecture
//!
//! - [`MetadataIndex`]: a plugin deriving [`IndexKey`]s from a stored
//!   descriptor and from a query. [`EndpointIndex`] and [`ArtifactIndex`] are
//!   the reference plugins.
//! - [`IndexStore`]: one plugin's key → values map.
//! - [`SecondaryIndexManager`]: owns plugins and their stores, indexes
//!   descriptors, and answers queries by intersecting plugin results.
//!
//! A query answer is an [`IndexLookup`]. `NotApplicable` means no plugin
//! understood the criteria and the caller should resolve some other way;
//! `Matched` with an empty set means the plugins understood the query and
//! nothing matched.

mod artifact;
mod endpoint;
pub mod location;
mod manager;
mod store;

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

pub use artifact::{ArtifactIndex, IndexingFunction, source_id};
pub use endpoint::{EndpointIndex, EndpointSelector};
pub use location::LocationKey;
pub use manager::SecondaryIndexManager;
pub use store::IndexStore;

use crate::criteria::CriteriaSet;
use crate::types::{EndpointType, EntityDescriptor, RoleType};

/// A canonical, hashable secondary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// An endpoint published by a role.
    Endpoint {
        role_type: RoleType,
        endpoint_type: EndpointType,
        location: LocationKey,
        /// Whether `location` is the endpoint's response location.
        response: bool,
    },
    /// Artifact source ID bytes.
    SourceId(Vec<u8>),
    /// Artifact resolution service location.
    SourceLocation(LocationKey),
    /// Key produced by a user-supplied plugin.
    Custom(String),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint {
                role_type,
                endpoint_type,
                location,
                response,
            } => write!(
                f,
                "endpoint({role_type}, {endpoint_type}, {}, response={response})",
                location.canonical()
            ),
            Self::SourceId(bytes) => write!(f, "source_id({})", hex::encode(bytes)),
            Self::SourceLocation(location) => write!(f, "source_location({})", location.canonical()),
            Self::Custom(key) => write!(f, "custom({key})"),
        }
    }
}

/// A secondary index plugin.
pub trait MetadataIndex: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Keys under which `descriptor` should be stored. Empty means the
    /// descriptor is not indexable by this plugin.
    fn keys_for_descriptor(&self, descriptor: &EntityDescriptor) -> HashSet<IndexKey>;

    /// Keys to look up for `criteria`, or `None` if this plugin does not
    /// understand any of the criteria.
    fn keys_for_criteria(&self, criteria: &CriteriaSet) -> Option<HashSet<IndexKey>>;
}

/// Result of a secondary index query.
#[derive(Debug, Clone)]
pub enum IndexLookup<T> {
    /// No index understood the criteria.
    NotApplicable,
    /// Indexes understood the criteria; the set may be empty.
    Matched(HashSet<T>),
}

impl<T> IndexLookup<T> {
    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// The matched set, or `None` if not applicable.
    pub fn into_matched(self) -> Option<HashSet<T>> {
        match self {
            Self::Matched(set) => Some(set),
            Self::NotApplicable => None,
        }
    }
}

impl<T: Eq + Hash> PartialEq for IndexLookup<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotApplicable, Self::NotApplicable) => true,
            (Self::Matched(a), Self::Matched(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: Eq + Hash> Eq for IndexLookup<T> {}
