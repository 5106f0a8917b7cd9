//! Endpoint location index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use super::location::{self, LocationKey};
use super::{IndexKey, MetadataIndex};
use crate::criteria::{CriteriaSet, EndpointCriterion, EntityRoleCriterion, StartsWithLocationCriterion};
use crate::types::{Endpoint, EndpointType, EntityDescriptor, RoleDescriptor, RoleType};

/// Chooses which endpoints are indexed.
pub type EndpointSelector = Arc<dyn Fn(&RoleDescriptor, &Endpoint) -> bool + Send + Sync>;

/// Indexes descriptors by `(role type, endpoint type, location, is response)`.
///
/// Queries need both an [`EntityRoleCriterion`] and an [`EndpointCriterion`].
/// With [`StartsWithLocationCriterion`] set, the query location also matches
/// endpoints registered at any of its path prefixes.
pub struct EndpointIndex {
    selector: EndpointSelector,
}

impl EndpointIndex {
    /// Index every endpoint.
    pub fn new() -> Self {
        Self {
            selector: Arc::new(|_: &RoleDescriptor, _: &Endpoint| true),
        }
    }

    /// Index only endpoints accepted by `selector`.
    pub fn with_selector(selector: impl Fn(&RoleDescriptor, &Endpoint) -> bool + Send + Sync + 'static) -> Self {
        Self {
            selector: Arc::new(selector),
        }
    }

    /// Index only the listed endpoint types of each role type.
    pub fn with_indexable_types(types: HashMap<RoleType, HashSet<EndpointType>>) -> Self {
        Self::with_selector(move |role, endpoint| {
            types
                .get(&role.role_type)
                .is_some_and(|endpoints| endpoints.contains(&endpoint.endpoint_type))
        })
    }

    fn location_variants(criteria: &CriteriaSet, location: &str) -> Vec<String> {
        let starts_with = criteria
            .get::<StartsWithLocationCriterion>()
            .is_some_and(|c| c.0);
        if starts_with {
            trace!(location, "producing path-trimmed key variants for starts-with match");
            location::starts_with_variants(location)
        } else {
            vec![location.to_string()]
        }
    }
}

impl Default for EndpointIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_key(role_type: &RoleType, endpoint_type: &EndpointType, location: &str, response: bool) -> IndexKey {
    IndexKey::Endpoint {
        role_type: role_type.clone(),
        endpoint_type: endpoint_type.clone(),
        location: LocationKey::new(location),
        response,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl MetadataIndex for EndpointIndex {
    fn name(&self) -> &str {
        "endpoint"
    }

    fn keys_for_descriptor(&self, descriptor: &EntityDescriptor) -> HashSet<IndexKey> {
        let mut keys = HashSet::new();
        for role in &descriptor.roles {
            for endpoint in role.endpoints.iter().filter(|e| (self.selector)(role, *e)) {
                if let Some(location) = non_blank(Some(&endpoint.location)) {
                    trace!(role = %role.role_type, endpoint = %endpoint.endpoint_type, location, "indexing endpoint");
                    keys.insert(endpoint_key(&role.role_type, &endpoint.endpoint_type, location, false));
                }
                if let Some(location) = non_blank(endpoint.response_location.as_deref()) {
                    trace!(role = %role.role_type, endpoint = %endpoint.endpoint_type, location, "indexing response endpoint");
                    keys.insert(endpoint_key(&role.role_type, &endpoint.endpoint_type, location, true));
                }
            }
        }
        keys
    }

    fn keys_for_criteria(&self, criteria: &CriteriaSet) -> Option<HashSet<IndexKey>> {
        let role = &criteria.get::<EntityRoleCriterion>()?.0;
        let endpoint = &criteria.get::<EndpointCriterion>()?.0;

        let mut keys = HashSet::new();
        if let Some(location) = non_blank(Some(&endpoint.location)) {
            for variant in Self::location_variants(criteria, location) {
                keys.insert(endpoint_key(role, &endpoint.endpoint_type, &variant, false));
            }
        }
        if let Some(location) = non_blank(endpoint.response_location.as_deref()) {
            for variant in Self::location_variants(criteria, location) {
                keys.insert(endpoint_key(role, &endpoint.endpoint_type, &variant, true));
            }
        }
        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

    fn sp(location: &str) -> EntityDescriptor {
        EntityDescriptor::new("https://sp.example.org").role(
            RoleDescriptor::new(RoleType::SpSso)
                .endpoint(Endpoint::new(EndpointType::AssertionConsumerService, POST, location)),
        )
    }

    fn acs_criteria(location: &str) -> CriteriaSet {
        CriteriaSet::new()
            .with(EntityRoleCriterion(RoleType::SpSso))
            .with(EndpointCriterion(Endpoint::new(
                EndpointType::AssertionConsumerService,
                POST,
                location,
            )))
    }

    #[test]
    fn descriptor_and_criteria_keys_agree() {
        let index = EndpointIndex::new();
        let stored = index.keys_for_descriptor(&sp("https://SP.example.org:443/acs"));
        let queried = index
            .keys_for_criteria(&acs_criteria("https://sp.example.org/acs"))
            .unwrap();
        assert_eq!(stored, queried);
    }

    #[test]
    fn response_location_gets_its_own_key() {
        let descriptor = EntityDescriptor::new("https://idp.example.org").role(
            RoleDescriptor::new(RoleType::IdpSso).endpoint(
                Endpoint::new(EndpointType::SingleLogoutService, POST, "https://idp.example.org/slo")
                    .response_location("https://idp.example.org/slo/response"),
            ),
        );
        let keys = EndpointIndex::new().keys_for_descriptor(&descriptor);
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|k| matches!(k, IndexKey::Endpoint { response: true, .. })));
    }

    #[test]
    fn criteria_need_role_and_endpoint() {
        let index = EndpointIndex::new();
        let role_only = CriteriaSet::new().with(EntityRoleCriterion(RoleType::SpSso));
        assert!(index.keys_for_criteria(&role_only).is_none());
    }

    #[test]
    fn blank_location_yields_empty_key_set() {
        let index = EndpointIndex::new();
        assert_eq!(index.keys_for_criteria(&acs_criteria("  ")), Some(HashSet::new()));
    }

    #[test]
    fn starts_with_matches_registered_prefix() {
        let index = EndpointIndex::new();
        let stored = index.keys_for_descriptor(&sp("https://sp.example.org/sso/"));
        let queried = index
            .keys_for_criteria(
                &acs_criteria("https://sp.example.org/sso/post/acs").with(StartsWithLocationCriterion(true)),
            )
            .unwrap();
        assert!(stored.iter().all(|k| queried.contains(k)));

        let exact = index
            .keys_for_criteria(&acs_criteria("https://sp.example.org/sso/post/acs"))
            .unwrap();
        assert!(stored.iter().all(|k| !exact.contains(k)));
    }

    #[test]
    fn selector_limits_indexed_endpoints() {
        let index = EndpointIndex::with_indexable_types(HashMap::from([(
            RoleType::IdpSso,
            HashSet::from([EndpointType::SingleSignOnService]),
        )]));
        assert!(index.keys_for_descriptor(&sp("https://sp.example.org/acs")).is_empty());
    }
}
