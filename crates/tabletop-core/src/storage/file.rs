//! File-based preference store for native platforms.

use super::{PreferenceStore, StorageError, StorageResult};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const FILE_NAME: &str = "preferences.json";

/// Preferences kept in one JSON object on disk.
///
/// Every write rewrites the whole file; the set of keys is tiny.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Store preferences in `dir`, creating it if needed.
    pub fn new(dir: PathBuf) -> StorageResult<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self {
            path: dir.join(FILE_NAME),
            lock: Mutex::new(()),
        })
    }

    /// File storage in the default location.
    ///
    /// On Unix: `~/.config/tabletop/`
    /// On Windows: `%APPDATA%\tabletop\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("tabletop"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| {
            StorageError::Io(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, values: &Map<String, Value>) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    fn update(&self, edit: impl FnOnce(&mut Map<String, Value>)) -> StorageResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
        let mut values = self.read_all()?;
        edit(&mut values);
        self.write_all(&values)
    }
}

impl PreferenceStore for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
        let values = self.read_all()?;
        Ok(values.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|values| {
            values.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
        storage.set("token", "secret").unwrap();
        storage.set("displayScale", "1.5").unwrap();
        drop(storage);

        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("secret"));
        assert_eq!(storage.get("displayScale").unwrap().as_deref(), Some("1.5"));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("nested")).unwrap();
        assert_eq!(storage.get("token").unwrap(), None);
        storage.remove("token").unwrap();
        assert!(storage.path().exists());
    }

    #[test]
    fn test_remove_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
        storage.set("token", "a").unwrap();
        storage.set("user", "{}").unwrap();
        storage.remove("token").unwrap();
        assert_eq!(storage.get("token").unwrap(), None);
        assert_eq!(storage.get("user").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
        fs::write(storage.path(), "not json").unwrap();
        assert!(matches!(
            storage.get("token"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
        fs::write(storage.path(), r#"{"displayScale": 2.0}"#).unwrap();
        assert_eq!(storage.get("displayScale").unwrap().as_deref(), Some("2.0"));
    }
}
