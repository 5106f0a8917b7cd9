//! Builder for dynamic resolvers.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::backing::EntityBackingStore;
use super::config::ResolverConfig;
use super::dynamic::{DynamicMetadataResolver, ResolverInner};
use super::expiration::ExpirationPolicy;
use super::management::ManagementTable;
use super::persistent::{
    DescriptorPredicate, PersistentCacheInitMetrics, PersistentCacheKeyGenerator, default_key_generator,
    default_validity_predicate,
};
use super::scheduler::TaskScheduler;
use crate::index::MetadataIndex;
use crate::persist::LoadSaveManager;
use crate::source::{MetadataFilter, OriginSource};
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

/// Configures and starts a [`DynamicMetadataResolver`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use heimdall::{DynamicMetadataResolver, ResolverConfig};
/// # use heimdall::index::EndpointIndex;
/// # use heimdall::source::{HttpOriginSource, RequestUrlBuilder};
/// # async fn example() -> heimdall::Result<()> {
/// let resolver = DynamicMetadataResolver::builder()
///     .id("mdq")
///     .origin(Arc::new(HttpOriginSource::new(RequestUrlBuilder::EntityId)?))
///     .index(Arc::new(EndpointIndex::new()))
///     .config(ResolverConfig::new().refresh_delay_factor(0.5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct DynamicResolverBuilder {
    id: Option<String>,
    origin: Option<Arc<dyn OriginSource>>,
    filter: Option<Arc<dyn MetadataFilter>>,
    indexes: Vec<Arc<dyn MetadataIndex>>,
    persistent_cache: Option<Arc<dyn LoadSaveManager>>,
    key_generator: Option<PersistentCacheKeyGenerator>,
    init_predicate: Option<DescriptorPredicate>,
    validity: Option<DescriptorPredicate>,
    config: ResolverConfig,
}

impl Default for DynamicResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicResolverBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            origin: None,
            filter: None,
            indexes: Vec::new(),
            persistent_cache: None,
            key_generator: None,
            init_predicate: None,
            validity: None,
            config: ResolverConfig::default(),
        }
    }

    /// Identifier used in logs and metric labels. Default: `"dynamic"`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Where missing or stale metadata is fetched from. Required.
    pub fn origin(mut self, origin: Arc<dyn OriginSource>) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Applied to every fetched or bootstrapped document before it is stored.
    pub fn filter(mut self, filter: Arc<dyn MetadataFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Add a secondary index.
    pub fn index(mut self, index: Arc<dyn MetadataIndex>) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn indexes(mut self, indexes: impl IntoIterator<Item = Arc<dyn MetadataIndex>>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    /// Enable write-through to, and bootstrap from, a persistent store.
    pub fn persistent_cache(mut self, manager: Arc<dyn LoadSaveManager>) -> Self {
        self.persistent_cache = Some(manager);
        self
    }

    /// Persistent cache key for a descriptor. Default: lower-hex SHA-1 of
    /// the entity ID.
    pub fn persistent_cache_key_generator(
        mut self,
        generator: impl Fn(&EntityDescriptor) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    /// Which valid cached entries to load at startup. Default: all.
    pub fn initialize_from_persistent_cache_predicate(
        mut self,
        predicate: impl Fn(&EntityDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.init_predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether a cached entry is still usable; failing entries are deleted
    /// at startup. Default: no `valid_until` has passed.
    pub fn validity_predicate(
        mut self,
        predicate: impl Fn(&EntityDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validity = Some(Arc::new(predicate));
        self
    }

    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and start the resolver.
    ///
    /// Schedules the cleanup sweeper, and bootstraps from the persistent
    /// cache either before returning or on a background task, per
    /// [`ResolverConfig::initialize_from_persistent_cache_in_background`].
    pub async fn build(self) -> Result<DynamicMetadataResolver> {
        let policy = ExpirationPolicy::from_config(&self.config)?;
        let origin = self
            .origin
            .ok_or_else(|| HeimdallError::Configuration("an origin source is required".into()))?;
        let id = match self.id {
            Some(id) if id.trim().is_empty() => {
                return Err(HeimdallError::Configuration("resolver id must not be blank".into()));
            }
            Some(id) => id.trim().to_string(),
            None => "dynamic".to_string(),
        };

        let init_metrics = PersistentCacheInitMetrics {
            enabled: self.persistent_cache.is_some(),
            ..Default::default()
        };
        let config = self.config;

        let inner = Arc::new(ResolverInner {
            id,
            policy,
            origin,
            filter: self.filter,
            store: EntityBackingStore::new(self.indexes),
            management: ManagementTable::new(policy.max_cache_duration()),
            persistent_cache: self.persistent_cache,
            key_generator: self.key_generator.unwrap_or_else(default_key_generator),
            init_predicate: self
                .init_predicate
                .unwrap_or_else(|| Arc::new(|_: &EntityDescriptor| true)),
            validity: self.validity.unwrap_or_else(default_validity_predicate),
            init_metrics: Mutex::new(init_metrics),
            destroyed: AtomicBool::new(false),
            config,
        });
        let scheduler = TaskScheduler::new();

        if inner.persistent_cache.is_some() {
            if inner.config.initialize_from_persistent_cache_in_background {
                let delay = Duration::from_secs(inner.config.background_init_from_cache_delay_secs);
                debug!(resolver = %inner.id, delay_secs = delay.as_secs(), "initializing from persistent cache in the background");
                let weak = Arc::downgrade(&inner);
                scheduler.schedule_once(delay, async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.initialize_from_persistent_cache().await;
                    }
                });
            } else {
                debug!(resolver = %inner.id, "initializing from persistent cache in the foreground");
                inner.initialize_from_persistent_cache().await;
            }
        }

        let weak = Arc::downgrade(&inner);
        scheduler.schedule_repeating(
            Duration::from_secs(inner.config.cleanup_task_delay_secs),
            Duration::from_secs(inner.config.cleanup_task_interval_secs),
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) if !inner.is_destroyed() => {
                            inner.sweep(Utc::now()).await;
                            ControlFlow::Continue(())
                        }
                        _ => ControlFlow::Break(()),
                    }
                }
            },
        );

        info!(
            resolver = %inner.id,
            source = inner.origin.name(),
            indexes = inner.store.indexes().indexes().count(),
            persistent_cache = inner.persistent_cache.is_some(),
            "dynamic metadata resolver started"
        );
        Ok(DynamicMetadataResolver::from_parts(inner, scheduler))
    }
}
