//! Artifact issuer index.

use std::collections::HashSet;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{trace, warn};

use super::{IndexKey, LocationKey, MetadataIndex};
use crate::criteria::{ArtifactCriterion, CriteriaSet};
use crate::types::{Artifact, EndpointType, EntityDescriptor, RoleType};
use crate::{HeimdallError, Result};

/// Derives index keys from a descriptor.
pub type IndexingFunction = Arc<dyn Fn(&EntityDescriptor) -> HashSet<IndexKey> + Send + Sync>;

/// Indexes descriptors by the artifact source IDs that identify them.
///
/// The default functions key each descriptor by the SHA-1 of its entity ID
/// and by every source ID declared in its roles' extensions. Indexing by
/// artifact resolution service location is available through
/// [`ArtifactIndex::with_source_locations`].
pub struct ArtifactIndex {
    functions: Vec<IndexingFunction>,
}

impl ArtifactIndex {
    pub fn new() -> Self {
        Self {
            functions: vec![Self::entity_id_source_id(), Self::source_id_extensions()],
        }
    }

    /// Default functions plus source location indexing.
    pub fn with_source_locations() -> Self {
        let mut index = Self::new();
        index.functions.push(Self::source_locations());
        index
    }

    /// Custom indexing functions. At least one is required.
    pub fn with_functions(functions: Vec<IndexingFunction>) -> Result<Self> {
        if functions.is_empty() {
            return Err(HeimdallError::Configuration(
                "artifact index needs at least one indexing function".into(),
            ));
        }
        Ok(Self { functions })
    }

    /// Source ID = SHA-1 of the UTF-8 entity ID.
    pub fn entity_id_source_id() -> IndexingFunction {
        Arc::new(|descriptor: &EntityDescriptor| {
            let Some(entity_id) = descriptor.trimmed_entity_id() else {
                return HashSet::new();
            };
            let key = IndexKey::SourceId(source_id(entity_id));
            trace!(entity_id, %key, "produced artifact source ID key");
            HashSet::from([key])
        })
    }

    /// Source IDs declared as hex values in role extensions.
    pub fn source_id_extensions() -> IndexingFunction {
        Arc::new(|descriptor: &EntityDescriptor| {
            let mut keys = HashSet::new();
            for role in &descriptor.roles {
                for value in role.source_ids.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
                    match hex::decode(value) {
                        Ok(bytes) if !bytes.is_empty() => {
                            keys.insert(IndexKey::SourceId(bytes));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(
                            entity_id = %descriptor.entity_id,
                            value,
                            error = %e,
                            "could not decode source ID extension value"
                        ),
                    }
                }
            }
            keys
        })
    }

    /// Locations of artifact resolution services on SSO roles.
    pub fn source_locations() -> IndexingFunction {
        Arc::new(|descriptor: &EntityDescriptor| {
            descriptor
                .roles
                .iter()
                .filter(|r| matches!(r.role_type, RoleType::IdpSso | RoleType::SpSso))
                .flat_map(|r| r.endpoints.iter())
                .filter(|e| e.endpoint_type == EndpointType::ArtifactResolutionService)
                .filter(|e| !e.location.trim().is_empty())
                .map(|e| IndexKey::SourceLocation(LocationKey::new(&e.location)))
                .collect()
        })
    }
}

impl Default for ArtifactIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-1 digest of an entity ID, as used for artifact source IDs.
pub fn source_id(entity_id: &str) -> Vec<u8> {
    Sha1::digest(entity_id.as_bytes()).to_vec()
}

impl MetadataIndex for ArtifactIndex {
    fn name(&self) -> &str {
        "artifact"
    }

    fn keys_for_descriptor(&self, descriptor: &EntityDescriptor) -> HashSet<IndexKey> {
        self.functions.iter().flat_map(|f| f(descriptor)).collect()
    }

    fn keys_for_criteria(&self, criteria: &CriteriaSet) -> Option<HashSet<IndexKey>> {
        let artifact = &criteria.get::<ArtifactCriterion>()?.0;
        let key = match artifact {
            Artifact::SourceId(bytes) => IndexKey::SourceId(bytes.clone()),
            Artifact::SourceLocation(location) => IndexKey::SourceLocation(LocationKey::new(location)),
        };
        Some(HashSet::from([key]))
    }
}
