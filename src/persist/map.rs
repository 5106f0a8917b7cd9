//! In-memory descriptor store.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::LoadSaveManager;
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

/// [`LoadSaveManager`] over a map, with the same key semantics as the
/// filesystem store.
#[derive(Debug, Default)]
pub struct MapLoadSaveManager {
    entries: Mutex<HashMap<String, EntityDescriptor>>,
}

impl MapLoadSaveManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LoadSaveManager for MapLoadSaveManager {
    fn list_keys(&self) -> Result<HashSet<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn load(&self, key: &str) -> Result<Option<EntityDescriptor>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, descriptor: &EntityDescriptor, overwrite: bool) -> Result<()> {
        let mut entries = self.entries.lock();
        if !overwrite && entries.contains_key(key) {
            return Err(HeimdallError::KeyExists(key.to_string()));
        }
        entries.insert(key.to_string(), descriptor.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn update_key(&self, current_key: &str, new_key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(current_key) {
            return Ok(false);
        }
        if entries.contains_key(new_key) {
            return Err(HeimdallError::KeyExists(new_key.to_string()));
        }
        if let Some(descriptor) = entries.remove(current_key) {
            entries.insert(new_key.to_string(), descriptor);
        }
        Ok(true)
    }
}
