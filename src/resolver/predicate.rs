//! Predicate filtering of resolved candidates.

use std::sync::Arc;

use tracing::trace;

use crate::criteria::{CriteriaSet, EntityRoleCriterion, EvaluableCriterion, ProtocolCriterion, SatisfyAnyCriterion};
use crate::types::{EntityDescriptor, RoleType};

enum Predicate<'a> {
    /// A role of this type, supporting `protocol` when given.
    Role { role_type: &'a RoleType, protocol: Option<&'a str> },
    Evaluable(&'a EvaluableCriterion),
}

impl Predicate<'_> {
    fn matches(&self, descriptor: &EntityDescriptor) -> bool {
        match self {
            Self::Role { role_type, protocol } => descriptor
                .roles_of(role_type)
                .any(|role| protocol.is_none_or(|p| role.supports_protocol(p))),
            Self::Evaluable(criterion) => criterion.evaluate(descriptor),
        }
    }
}

/// The evaluable predicates carried by a criteria set.
pub struct CriteriaPredicates<'a> {
    predicates: Vec<Predicate<'a>>,
    satisfy_any: bool,
}

impl<'a> CriteriaPredicates<'a> {
    pub fn from_criteria(criteria: &'a CriteriaSet) -> Self {
        let mut predicates = Vec::new();
        if let Some(EntityRoleCriterion(role_type)) = criteria.get::<EntityRoleCriterion>() {
            predicates.push(Predicate::Role {
                role_type,
                protocol: criteria.get::<ProtocolCriterion>().map(|p| p.0.as_str()),
            });
        }
        if let Some(evaluable) = criteria.get::<EvaluableCriterion>() {
            predicates.push(Predicate::Evaluable(evaluable));
        }
        Self {
            predicates,
            satisfy_any: criteria.get::<SatisfyAnyCriterion>().is_some_and(|c| c.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// All predicates hold, or any one does under `SatisfyAnyCriterion(true)`.
    pub fn matches(&self, descriptor: &EntityDescriptor) -> bool {
        if self.satisfy_any {
            self.predicates.iter().any(|p| p.matches(descriptor))
        } else {
            self.predicates.iter().all(|p| p.matches(descriptor))
        }
    }

    /// Keep the candidates the predicates accept.
    ///
    /// With no predicates the candidates pass unchanged, or none do if
    /// `empty_if_no_predicates` is set.
    pub fn filter(
        &self,
        candidates: Vec<Arc<EntityDescriptor>>,
        empty_if_no_predicates: bool,
    ) -> Vec<Arc<EntityDescriptor>> {
        if self.predicates.is_empty() {
            return if empty_if_no_predicates { Vec::new() } else { candidates };
        }
        let before = candidates.len();
        let kept: Vec<_> = candidates.into_iter().filter(|d| self.matches(d)).collect();
        trace!(
            predicates = self.predicates.len(),
            satisfy_any = self.satisfy_any,
            before,
            after = kept.len(),
            "filtered candidates by predicates"
        );
        kept
    }
}
