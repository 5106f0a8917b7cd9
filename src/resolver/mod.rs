//! The dynamic resolution engine.
//!
//! # Architecture
//!
//! - [`DynamicMetadataResolver`]: answers queries, fetching from an
//!   [`OriginSource`](crate::source::OriginSource) on a miss or once an
//!   entity's refresh trigger has passed.
//! - [`EntityBackingStore`]: the live descriptors and their secondary
//!   indexes.
//! - [`ManagementTable`] / [`EntityManagementData`]: per-entity timestamps
//!   and the reader/writer lock that serialises fetches of one entity.
//! - [`ExpirationPolicy`]: expiration and refresh-trigger arithmetic.
//! - Cleanup sweeper: a periodic task evicting expired and idle entities.
//! - Persistent cache bootstrap: reloads entries saved by a previous run.
//!
//! # Locking
//!
//! Each entity ID has its own fair reader/writer lock. Readers that find
//! fresh metadata return under the read lock; a miss or stale entry
//! escalates to the write lock and re-checks before fetching, so concurrent
//! requests for one entity collapse into a single fetch. No table-wide lock
//! is held while fetching.

mod backing;
mod builder;
mod config;
mod dynamic;
mod expiration;
mod management;
mod persistent;
mod predicate;
mod scheduler;
mod sweeper;

pub use backing::EntityBackingStore;
pub use builder::DynamicResolverBuilder;
pub use config::ResolverConfig;
pub use dynamic::DynamicMetadataResolver;
pub use expiration::ExpirationPolicy;
pub use management::{EntityManagementData, Lifecycle, ManagementTable};
pub use persistent::{
    DescriptorPredicate, PersistentCacheInitMetrics, PersistentCacheKeyGenerator, default_key_generator,
    default_validity_predicate,
};
pub use predicate::CriteriaPredicates;
