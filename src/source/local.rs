//! Origin source backed by a local descriptor store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{EntityIdDigestGenerator, OriginSource};
use crate::Result;
use crate::criteria::CriteriaSet;
use crate::persist::LoadSaveManager;
use crate::types::EntityDescriptor;

/// Serves documents from a [`LoadSaveManager`], keyed by a digest of the
/// requested entity ID.
pub struct LocalOriginSource {
    manager: Arc<dyn LoadSaveManager>,
    key_generator: EntityIdDigestGenerator,
}

impl LocalOriginSource {
    pub fn new(manager: Arc<dyn LoadSaveManager>) -> Self {
        Self {
            manager,
            key_generator: EntityIdDigestGenerator::new(),
        }
    }

    /// Use a custom key generator.
    pub fn key_generator(mut self, generator: EntityIdDigestGenerator) -> Self {
        self.key_generator = generator;
        self
    }
}

#[async_trait]
impl OriginSource for LocalOriginSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        let Some(key) = self.key_generator.generate_for(criteria) else {
            debug!("no entity ID in criteria, nothing to load");
            return Ok(None);
        };
        trace!(key = %key, "loading descriptor from local store");
        self.manager.load(&key)
    }
}
