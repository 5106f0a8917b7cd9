//! Dynamic resolver behaviour: fetch on miss, at-most-one fetch per entity,
//! lifecycle arithmetic, refresh, eviction, secondary index queries and
//! shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use futures_util::future::join_all;
use tokio::sync::Barrier;

use heimdall::criteria::{
    ArtifactCriterion, EndpointCriterion, EntityIdCriterion, EntityRoleCriterion, EvaluableCriterion,
    SatisfyAnyCriterion, StartsWithLocationCriterion,
};
use heimdall::index::{ArtifactIndex, EndpointIndex, source_id};
use heimdall::source::OriginSource;
use heimdall::{
    Artifact, CriteriaSet, DynamicMetadataResolver, Endpoint, EndpointType, EntityDescriptor, HeimdallError, Result,
    ResolverConfig, RoleDescriptor, RoleType,
};

const IDP: &str = "https://idp.example.org/idp";
const SP: &str = "https://sp.example.org/shibboleth";
const POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const ACS: &str = "https://sp.example.org/Shibboleth.sso/SAML2/POST";

// ============================================================================
// Mock origins
// ============================================================================

#[derive(Default)]
struct MockOrigin {
    documents: Mutex<HashMap<String, EntityDescriptor>>,
    fetches: AtomicU32,
    failing: AtomicBool,
    delay: Duration,
}

impl MockOrigin {
    fn with(documents: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        let origin = Self::default();
        for document in documents {
            origin.publish(document);
        }
        origin
    }

    fn slow(delay: Duration, documents: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        Self {
            delay,
            ..Self::with(documents)
        }
    }

    fn publish(&self, document: EntityDescriptor) {
        self.documents
            .lock()
            .unwrap()
            .insert(document.entity_id.clone(), document);
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginSource for MockOrigin {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HeimdallError::Http("connection refused".into()));
        }
        let Some(entity_id) = criteria.entity_id() else {
            return Ok(None);
        };
        Ok(self.documents.lock().unwrap().get(entity_id).cloned())
    }
}

/// Every fetch waits on one shared barrier.
struct RendezvousOrigin {
    barrier: Barrier,
}

#[async_trait]
impl OriginSource for RendezvousOrigin {
    fn name(&self) -> &str {
        "rendezvous"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        self.barrier.wait().await;
        Ok(criteria.entity_id().map(EntityDescriptor::new))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn idp() -> EntityDescriptor {
    EntityDescriptor::new(IDP).role(
        RoleDescriptor::new(RoleType::IdpSso)
            .protocol("urn:oasis:names:tc:SAML:2.0:protocol")
            .endpoint(Endpoint::new(
                EndpointType::SingleSignOnService,
                POST,
                "https://idp.example.org/idp/profile/SAML2/POST/SSO",
            )),
    )
}

fn sp() -> EntityDescriptor {
    EntityDescriptor::new(SP).role(
        RoleDescriptor::new(RoleType::SpSso)
            .protocol("urn:oasis:names:tc:SAML:2.0:protocol")
            .endpoint(Endpoint::new(EndpointType::AssertionConsumerService, POST, ACS)),
    )
}

fn by_id(entity_id: &str) -> CriteriaSet {
    CriteriaSet::new().with(EntityIdCriterion::new(entity_id))
}

fn acs_query(location: &str) -> CriteriaSet {
    CriteriaSet::new()
        .with(EntityRoleCriterion(RoleType::SpSso))
        .with(EndpointCriterion(Endpoint::new(
            EndpointType::AssertionConsumerService,
            POST,
            location,
        )))
}

async fn build(origin: Arc<MockOrigin>, config: ResolverConfig) -> DynamicMetadataResolver {
    DynamicMetadataResolver::builder()
        .origin(origin)
        .index(Arc::new(EndpointIndex::new()))
        .index(Arc::new(ArtifactIndex::new()))
        .config(config)
        .build()
        .await
        .unwrap()
}

/// Move the entity's refresh trigger into the past.
async fn make_stale(resolver: &DynamicMetadataResolver, entity_id: &str) {
    let tracker = resolver.management_data(entity_id).unwrap();
    tracker.write().await.refresh_trigger = Utc::now() - TimeDelta::seconds(1);
}

// ============================================================================
// Fetch on demand
// ============================================================================

#[tokio::test]
async fn miss_fetches_once_then_serves_from_memory() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    let first = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].entity_id, IDP);

    let second = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert_eq!(origin.fetch_count(), 1);
    assert_eq!(resolver.len(), 1);
}

#[tokio::test]
async fn entity_id_is_trimmed() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    resolver.resolve(&by_id(IDP)).await.unwrap();
    let padded = resolver.resolve(&by_id(&format!("  {IDP}\n"))).await.unwrap();
    assert_eq!(padded.len(), 1);
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn unknown_entity_resolves_to_nothing() {
    let origin = Arc::new(MockOrigin::default());
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    let resolved = resolver.resolve(&by_id("https://unknown.example.org")).await.unwrap();
    assert!(resolved.is_empty());
    assert_eq!(origin.fetch_count(), 1);
    assert!(resolver.is_empty());
}

#[tokio::test]
async fn origin_error_resolves_to_nothing() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    origin.fail(true);
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    assert!(resolver.resolve(&by_id(IDP)).await.unwrap().is_empty());
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn resolve_single_returns_first_match() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin, ResolverConfig::default()).await;

    let single = resolver.resolve_single(&by_id(IDP)).await.unwrap();
    assert_eq!(single.map(|d| d.entity_id.clone()).as_deref(), Some(IDP));
    assert!(resolver.resolve_single(&by_id(SP)).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_of_one_entity_fetch_once() {
    let origin = Arc::new(MockOrigin::slow(Duration::from_millis(100), [idp()]));
    let resolver = Arc::new(build(origin.clone(), ResolverConfig::default()).await);

    let tasks = (0..16).map(|_| {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve(&by_id(IDP)).await })
    });
    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap().len(), 1);
    }
    assert_eq!(origin.fetch_count(), 1);
}

#[tokio::test]
async fn different_entities_fetch_concurrently() {
    // Both fetches must be in flight together to pass the barrier
    let origin = Arc::new(RendezvousOrigin {
        barrier: Barrier::new(2),
    });
    let resolver = DynamicMetadataResolver::builder()
        .origin(origin)
        .build()
        .await
        .unwrap();

    let (idp_query, sp_query) = (by_id(IDP), by_id(SP));
    let both = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(resolver.resolve(&idp_query), resolver.resolve(&sp_query))
    })
    .await
    .expect("fetches of different entities were serialised");
    assert_eq!(both.0.unwrap().len(), 1);
    assert_eq!(both.1.unwrap().len(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn document_without_hints_uses_maximum_duration() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    let lifecycle = resolver.management_data(IDP).unwrap().lifecycle().await;
    let loaded = lifecycle.last_update.unwrap();
    assert_eq!(lifecycle.expiration - loaded, TimeDelta::hours(8));
    assert_eq!(lifecycle.refresh_trigger - loaded, TimeDelta::hours(6));
}

#[tokio::test]
async fn cache_duration_hint_shortens_lifetime() {
    let origin = Arc::new(MockOrigin::with([idp().cache_duration(Duration::from_secs(2 * 3600))]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    let lifecycle = resolver.management_data(IDP).unwrap().lifecycle().await;
    let loaded = lifecycle.last_update.unwrap();
    assert_eq!(lifecycle.expiration - loaded, TimeDelta::hours(2));
    assert_eq!(lifecycle.refresh_trigger - loaded, TimeDelta::minutes(90));
}

#[tokio::test]
async fn short_hint_is_raised_to_minimum_duration() {
    let origin = Arc::new(MockOrigin::with([idp().cache_duration(Duration::from_secs(60))]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    let lifecycle = resolver.management_data(IDP).unwrap().lifecycle().await;
    let loaded = lifecycle.last_update.unwrap();
    assert_eq!(lifecycle.expiration - loaded, TimeDelta::minutes(10));
    assert_eq!(lifecycle.refresh_trigger - loaded, TimeDelta::minutes(10));
}

#[tokio::test]
async fn stale_entity_is_refetched_after_refresh_trigger() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    resolver.resolve(&by_id(IDP)).await.unwrap();
    origin.publish(idp().role(RoleDescriptor::new(RoleType::AttributeAuthority)));
    resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(origin.fetch_count(), 1);
    make_stale(&resolver, IDP).await;

    let refreshed = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(origin.fetch_count(), 2);
    assert_eq!(refreshed[0].roles.len(), 2);
}

#[tokio::test]
async fn failed_refresh_keeps_serving_cached_copy() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;

    resolver.resolve(&by_id(IDP)).await.unwrap();
    origin.fail(true);
    make_stale(&resolver, IDP).await;

    let resolved = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(origin.fetch_count(), 2);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].entity_id, IDP);
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn filter_rejecting_first_fetch_stores_nothing() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = DynamicMetadataResolver::builder()
        .origin(origin)
        .filter(Arc::new(|_: EntityDescriptor| -> Result<Option<EntityDescriptor>> { Ok(None) }))
        .build()
        .await
        .unwrap();

    assert!(resolver.resolve(&by_id(IDP)).await.unwrap().is_empty());
    assert!(resolver.is_empty());
}

#[tokio::test]
async fn filter_rejecting_refresh_keeps_cached_copy() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let reject = Arc::new(AtomicBool::new(false));
    let flag = reject.clone();
    let resolver = DynamicMetadataResolver::builder()
        .origin(origin.clone())
        .filter(Arc::new(move |d: EntityDescriptor| -> Result<Option<EntityDescriptor>> {
            Ok((!flag.load(Ordering::SeqCst)).then_some(d))
        }))
        .build()
        .await
        .unwrap();

    let first = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(first.len(), 1);

    reject.store(true, Ordering::SeqCst);
    origin.publish(idp().role(RoleDescriptor::new(RoleType::AttributeAuthority)));
    make_stale(&resolver, IDP).await;

    let resolved = resolver.resolve(&by_id(IDP)).await.unwrap();
    assert_eq!(origin.fetch_count(), 2);
    assert_eq!(resolved.len(), 1);
    assert!(Arc::ptr_eq(&first[0], &resolved[0]));
    assert_eq!(resolver.len(), 1);
}

#[tokio::test]
async fn filter_error_leaves_entity_unresolved() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = DynamicMetadataResolver::builder()
        .origin(origin)
        .filter(Arc::new(|_: EntityDescriptor| -> Result<Option<EntityDescriptor>> {
            Err(HeimdallError::Filter("signature invalid".into()))
        }))
        .build()
        .await
        .unwrap();

    assert!(resolver.resolve(&by_id(IDP)).await.unwrap().is_empty());
}

#[tokio::test]
async fn document_for_other_entity_is_not_stored() {
    let origin = Arc::new(MockOrigin::default());
    origin
        .documents
        .lock()
        .unwrap()
        .insert(IDP.to_string(), EntityDescriptor::new("https://impostor.example.org"));
    let resolver = build(origin, ResolverConfig::default()).await;

    assert!(resolver.resolve(&by_id(IDP)).await.unwrap().is_empty());
    assert!(resolver.is_empty());
}

#[tokio::test]
async fn role_criterion_filters_resolved_entity() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin, ResolverConfig::default()).await;

    let as_sp = by_id(IDP).with(EntityRoleCriterion(RoleType::SpSso));
    assert!(resolver.resolve(&as_sp).await.unwrap().is_empty());

    let as_idp = by_id(IDP).with(EntityRoleCriterion(RoleType::IdpSso));
    assert_eq!(resolver.resolve(&as_idp).await.unwrap().len(), 1);
}

// ============================================================================
// Secondary indexes
// ============================================================================

#[tokio::test]
async fn endpoint_query_finds_resolved_entity() {
    let origin = Arc::new(MockOrigin::with([idp(), sp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();
    resolver.resolve(&by_id(SP)).await.unwrap();

    let matched = resolver.resolve(&acs_query(ACS)).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].entity_id, SP);

    // Index queries never reach the origin
    assert!(resolver.resolve(&acs_query("https://sp.example.org/other")).await.unwrap().is_empty());
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn endpoint_query_with_starts_with_matches_prefix() {
    let base = "https://sp.example.org/acs/";
    let descriptor = EntityDescriptor::new(SP).role(
        RoleDescriptor::new(RoleType::SpSso).endpoint(Endpoint::new(EndpointType::AssertionConsumerService, POST, base)),
    );
    let origin = Arc::new(MockOrigin::with([descriptor]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(SP)).await.unwrap();

    let longer = "https://sp.example.org/acs/post?target=x";
    assert!(resolver.resolve(&acs_query(longer)).await.unwrap().is_empty());

    let prefix_query = acs_query(longer).with(StartsWithLocationCriterion(true));
    assert_eq!(resolver.resolve(&prefix_query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn artifact_query_finds_entity_by_source_id() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    let query = CriteriaSet::new().with(ArtifactCriterion(Artifact::SourceId(source_id(IDP))));
    let matched = resolver.resolve(&query).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].entity_id, IDP);
}

#[tokio::test]
async fn inapplicable_query_returns_nothing_by_default() {
    let origin = Arc::new(MockOrigin::with([idp(), sp()]));
    let resolver = build(origin.clone(), ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();
    resolver.resolve(&by_id(SP)).await.unwrap();

    let by_role = CriteriaSet::new().with(EntityRoleCriterion(RoleType::SpSso));
    assert!(resolver.resolve(&by_role).await.unwrap().is_empty());
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn predicates_only_mode_filters_all_live_entities() {
    let origin = Arc::new(MockOrigin::with([idp(), sp()]));
    let resolver = build(origin, ResolverConfig::new().resolve_via_predicates_only(true)).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();
    resolver.resolve(&by_id(SP)).await.unwrap();

    let by_role = CriteriaSet::new().with(EntityRoleCriterion(RoleType::SpSso));
    let matched = resolver.resolve(&by_role).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].entity_id, SP);

    let either = CriteriaSet::new()
        .with(EntityRoleCriterion(RoleType::SpSso))
        .with(EvaluableCriterion::new(|d: &EntityDescriptor| d.entity_id == IDP))
        .with(SatisfyAnyCriterion(true));
    assert_eq!(resolver.resolve(&either).await.unwrap().len(), 2);

    // No predicates to apply
    let nothing = CriteriaSet::new().with(SatisfyAnyCriterion(false));
    assert!(resolver.resolve(&nothing).await.unwrap().is_empty());
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn sweep_evicts_expired_entities() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin.clone(), ResolverConfig::new().remove_idle_entity_data(false)).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    assert_eq!(resolver.sweep().await, 0);
    assert_eq!(resolver.len(), 1);

    assert_eq!(resolver.sweep_at(Utc::now() + TimeDelta::hours(9)).await, 1);
    assert!(resolver.is_empty());
    assert!(resolver.management_data(IDP).is_none());
    assert!(resolver.resolve(&acs_query(ACS)).await.unwrap().is_empty());

    // Evicted entities are fetched again on demand
    assert_eq!(resolver.resolve(&by_id(IDP)).await.unwrap().len(), 1);
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn sweep_evicts_idle_entities() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let config = ResolverConfig::new().max_idle_entity_data(Duration::from_secs(3600));
    let resolver = build(origin, config).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    assert_eq!(resolver.sweep_at(Utc::now() + TimeDelta::minutes(30)).await, 0);
    assert_eq!(resolver.sweep_at(Utc::now() + TimeDelta::hours(2)).await, 1);
    assert!(resolver.is_empty());
}

#[tokio::test]
async fn idle_removal_can_be_disabled() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let config = ResolverConfig::new()
        .max_idle_entity_data(Duration::from_secs(3600))
        .remove_idle_entity_data(false);
    let resolver = build(origin, config).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    assert_eq!(resolver.sweep_at(Utc::now() + TimeDelta::hours(2)).await, 0);
    assert_eq!(resolver.len(), 1);
}

#[tokio::test]
async fn sweep_drops_trackers_of_unresolved_entities() {
    let origin = Arc::new(MockOrigin::default());
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();
    assert!(resolver.management_data(IDP).is_some());

    // Nothing was evicted, but the tracker goes
    assert_eq!(resolver.sweep_at(Utc::now() + TimeDelta::hours(9)).await, 0);
    assert!(resolver.management_data(IDP).is_none());
}

// ============================================================================
// Builder and shutdown
// ============================================================================

#[tokio::test]
async fn build_requires_origin() {
    let result = DynamicMetadataResolver::builder().build().await;
    assert!(matches!(result, Err(HeimdallError::Configuration(_))));
}

#[tokio::test]
async fn build_rejects_blank_id_and_bad_config() {
    let blank = DynamicMetadataResolver::builder()
        .id("  ")
        .origin(Arc::new(MockOrigin::default()))
        .build()
        .await;
    assert!(matches!(blank, Err(HeimdallError::Configuration(_))));

    let inverted = DynamicMetadataResolver::builder()
        .origin(Arc::new(MockOrigin::default()))
        .config(
            ResolverConfig::new()
                .min_cache_duration(Duration::from_secs(7200))
                .max_cache_duration(Duration::from_secs(3600)),
        )
        .build()
        .await;
    assert!(matches!(inverted, Err(HeimdallError::Configuration(_))));
}

#[tokio::test]
async fn default_id_is_dynamic() {
    let resolver = build(Arc::new(MockOrigin::default()), ResolverConfig::default()).await;
    assert_eq!(resolver.id(), "dynamic");
}

#[tokio::test]
async fn shutdown_clears_state_and_rejects_resolves() {
    let origin = Arc::new(MockOrigin::with([idp()]));
    let resolver = build(origin, ResolverConfig::default()).await;
    resolver.resolve(&by_id(IDP)).await.unwrap();

    resolver.shutdown();
    assert!(resolver.is_shut_down());
    assert!(resolver.is_empty());
    assert!(matches!(resolver.resolve(&by_id(IDP)).await, Err(HeimdallError::ShutDown)));
    assert_eq!(resolver.sweep().await, 0);

    // Idempotent
    resolver.shutdown();
}
