//! Persistent descriptor storage.
//!
//! A [`LoadSaveManager`] is a string-keyed store of descriptors used to
//! survive restarts: the resolver writes fetched documents through to it and
//! bootstraps from it at startup. Operations are synchronous and
//! best-effort from the resolver's point of view; failures are logged, and
//! the in-memory cache stays authoritative.
//!
//! - [`FilesystemLoadSaveManager`]: one file per key in a base directory.
//! - [`MapLoadSaveManager`]: in-memory, for tests and embedding.

mod filesystem;
mod map;

pub use filesystem::FilesystemLoadSaveManager;
pub use map::MapLoadSaveManager;

use std::collections::HashSet;

use tracing::warn;

use crate::Result;
use crate::types::EntityDescriptor;

/// Lazy sequence of stored `(key, descriptor)` pairs.
pub type StoredEntries<'a> = Box<dyn Iterator<Item = (String, EntityDescriptor)> + Send + 'a>;

/// String-keyed descriptor store.
pub trait LoadSaveManager: Send + Sync {
    /// Snapshot of the stored keys.
    fn list_keys(&self) -> Result<HashSet<String>>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Load the descriptor stored under `key`, or `None` if there is none.
    fn load(&self, key: &str) -> Result<Option<EntityDescriptor>>;

    /// Store `descriptor` under `key`.
    ///
    /// Fails with [`KeyExists`](crate::HeimdallError::KeyExists) if `key` is
    /// taken and `overwrite` is false.
    fn save(&self, key: &str, descriptor: &EntityDescriptor, overwrite: bool) -> Result<()>;

    /// Remove `key`. Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Move the entry at `current_key` to `new_key`.
    ///
    /// Returns `false` if `current_key` does not exist. Fails if `new_key`
    /// is already taken.
    fn update_key(&self, current_key: &str, new_key: &str) -> Result<bool>;

    /// Every stored entry, in key order.
    ///
    /// The key set is captured when called; entries are loaded lazily as the
    /// sequence is consumed. Entries that fail to load, or have disappeared
    /// since the snapshot, are logged and skipped.
    fn list_all(&self) -> Result<StoredEntries<'_>> {
        let mut keys: Vec<String> = self.list_keys()?.into_iter().collect();
        keys.sort_unstable();
        Ok(Box::new(keys.into_iter().filter_map(move |key| {
            match self.load(&key) {
                Ok(Some(descriptor)) => Some((key, descriptor)),
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to load persistent cache entry, skipping");
                    None
                }
            }
        })))
    }
}
