//! Filesystem-backed descriptor store.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::LoadSaveManager;
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

const TMP_SUFFIX: &str = ".tmp";

/// Stores each key as a file directly under a base directory.
///
/// Documents parsed from bytes are written back verbatim; others are written
/// as JSON. Writes go to a hidden temporary file first and are renamed into
/// place.
#[derive(Debug, Clone)]
pub struct FilesystemLoadSaveManager {
    base_dir: PathBuf,
}

impl FilesystemLoadSaveManager {
    /// Use `base_dir`, creating it if missing.
    ///
    /// The path must be absolute and, if it exists, a directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.is_absolute() {
            return Err(HeimdallError::Configuration(format!(
                "persistent cache directory must be absolute: {}",
                base_dir.display()
            )));
        }
        if base_dir.exists() && !base_dir.is_dir() {
            return Err(HeimdallError::Configuration(format!(
                "persistent cache path is not a directory: {}",
                base_dir.display()
            )));
        }
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            HeimdallError::Configuration(format!(
                "failed to create persistent cache dir {}: {e}",
                base_dir.display()
            ))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path for `key`, rejecting keys that are not a single path component
    /// and paths occupied by something other than a regular file.
    ///
    /// Keys are used exactly as given, so every listed file name loads back.
    fn file_for(&self, key: &str) -> Result<PathBuf> {
        if key.trim().is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(HeimdallError::InvalidInput(format!(
                "persistent cache key is not a plain file name: '{key}'"
            )));
        }
        let path = self.base_dir.join(key);
        if path.exists() && !path.is_file() {
            return Err(HeimdallError::NotAFile(path.display().to_string()));
        }
        Ok(path)
    }

    fn is_temporary(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(TMP_SUFFIX)
    }
}

impl LoadSaveManager for FilesystemLoadSaveManager {
    fn list_keys(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if !Self::is_temporary(&name) => {
                    keys.insert(name);
                }
                Ok(_) => {}
                Err(name) => debug!(name = ?name, "skipping non-UTF-8 file name"),
            }
        }
        Ok(keys)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.file_for(key)?.exists())
    }

    fn load(&self, key: &str) -> Result<Option<EntityDescriptor>> {
        let path = self.file_for(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "persistent cache file does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(EntityDescriptor::from_json_slice(&bytes)?))
    }

    fn save(&self, key: &str, descriptor: &EntityDescriptor, overwrite: bool) -> Result<()> {
        let path = self.file_for(key)?;
        if !overwrite && path.exists() {
            return Err(HeimdallError::KeyExists(key.to_string()));
        }

        let tmp_path = self.base_dir.join(format!(".{key}{TMP_SUFFIX}"));
        std::fs::write(&tmp_path, descriptor.to_bytes()?)?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        trace!(path = %path.display(), "saved descriptor");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.file_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn update_key(&self, current_key: &str, new_key: &str) -> Result<bool> {
        let current = self.file_for(current_key)?;
        let new = self.file_for(new_key)?;
        if !current.exists() {
            return Ok(false);
        }
        if new.exists() {
            return Err(HeimdallError::KeyExists(new_key.to_string()));
        }
        std::fs::rename(&current, &new)?;
        Ok(true)
    }
}
