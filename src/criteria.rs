//! Query criteria.
//!
//! A [`CriteriaSet`] is a typed bag: at most one value per criterion type,
//! looked up by type. Resolvers and indexes pick out the criteria they
//! understand and ignore the rest.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{Artifact, Endpoint, EntityDescriptor, RoleType};

/// A heterogeneous set of query criteria keyed by type.
#[derive(Clone, Default)]
pub struct CriteriaSet {
    entries: HashMap<TypeId, Entry>,
}

#[derive(Clone)]
struct Entry {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl CriteriaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion, replacing any existing one of the same type.
    pub fn with<C: Any + Send + Sync>(mut self, criterion: C) -> Self {
        self.insert(criterion);
        self
    }

    /// Add a criterion, replacing any existing one of the same type.
    pub fn insert<C: Any + Send + Sync>(&mut self, criterion: C) {
        self.entries.insert(
            TypeId::of::<C>(),
            Entry {
                type_name: std::any::type_name::<C>(),
                value: Arc::new(criterion),
            },
        );
    }

    /// The criterion of type `C`, if present.
    pub fn get<C: Any>(&self) -> Option<&C> {
        self.entries
            .get(&TypeId::of::<C>())
            .and_then(|e| e.value.downcast_ref::<C>())
    }

    pub fn contains<C: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trimmed entity ID from an [`EntityIdCriterion`], or `None` if absent or blank.
    pub fn entity_id(&self) -> Option<&str> {
        let id = self.get::<EntityIdCriterion>()?.0.trim();
        (!id.is_empty()).then_some(id)
    }
}

impl fmt::Debug for CriteriaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_struct("CriteriaSet").field("criteria", &names).finish()
    }
}

/// Primary lookup key: the entity ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIdCriterion(pub String);

impl EntityIdCriterion {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self(entity_id.into())
    }
}

/// Require a role of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRoleCriterion(pub RoleType);

/// Require the role to support this protocol URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolCriterion(pub String);

/// Match entities publishing this endpoint (type and location).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCriterion(pub Endpoint);

/// Match the issuer of this artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCriterion(pub Artifact);

/// Treat location-based criteria as prefixes rather than exact matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartsWithLocationCriterion(pub bool);

/// Accept a candidate satisfying any evaluable criterion, rather than all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatisfyAnyCriterion(pub bool);

/// Arbitrary predicate over candidate descriptors.
#[derive(Clone)]
pub struct EvaluableCriterion(Arc<dyn Fn(&EntityDescriptor) -> bool + Send + Sync>);

impl EvaluableCriterion {
    pub fn new(predicate: impl Fn(&EntityDescriptor) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn evaluate(&self, descriptor: &EntityDescriptor) -> bool {
        (self.0)(descriptor)
    }
}

impl fmt::Debug for EvaluableCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvaluableCriterion(..)")
    }
}
