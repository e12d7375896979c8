//! Persistence backends.
//!
//! Two stores with different owners:
//!
//! - [`UserStore`]: per-user string key/value storage scoped to one browser
//!   profile. Synchronous, like the storage it stands in for.
//! - [`ConfigStore`]: remote JSON documents addressed by id (admin document,
//!   shipped defaults, legacy snapshot, cleanup backups).
//!
//! Each has an in-memory implementation and a file-backed one used by the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, SkinError};

// ============================================================================
// User store
// ============================================================================

/// Per-user string key/value storage.
pub trait UserStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    values: Mutex<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write, for exercising persist failures.
    pub fn read_only(values: HashMap<String, String>) -> Self {
        Self {
            values: Mutex::new(values),
            read_only: true,
        }
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.read_only {
            return Err(SkinError::Persist(format!(
                "user store is read-only (key '{}')",
                key
            )));
        }
        Ok(())
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// User store persisted as a single JSON object file.
#[derive(Debug)]
pub struct FileUserStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileUserStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)
            .map_err(|e| SkinError::Persist(format!("{}: {}", self.path.display(), e)))
    }
}

impl UserStore for FileUserStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

// ============================================================================
// Config store
// ============================================================================

/// Remote JSON document store keyed by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means it does not exist.
    async fn get(&self, id: &str) -> Result<Option<Value>>;
    /// Create or replace a document.
    async fn put(&self, id: &str, document: &Value) -> Result<()>;
    /// Ids of all stored documents.
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-memory config store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn put(&self, id: &str, document: &Value) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Config store backed by a directory of `<id>.json` files.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn document_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(SkinError::Config(format!("invalid document id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config document missing");
                Ok(None)
            }
            Err(e) => Err(SkinError::ConfigUnavailable(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, id: &str, document: &Value) -> Result<()> {
        let path = self.document_path(id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SkinError::Persist(format!("{}: {}", self.dir.display(), e)))?;
        let content = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SkinError::Persist(format!("{}: {}", path.display(), e)))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_user_store() {
        let store = MemoryUserStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_read_only_user_store() {
        let store = MemoryUserStore::read_only(HashMap::from([(
            "k".to_string(),
            "v".to_string(),
        )]));
        assert_eq!(store.get("k").as_deref(), Some("v"));
        assert!(matches!(store.set("k", "w"), Err(SkinError::Persist(_))));
    }

    #[test]
    fn test_file_user_store_persists() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("user").join("store.json");
        {
            let store = FileUserStore::open(path.clone()).unwrap();
            store.set("skinManager.selectedSkin", "Ultrachromic").unwrap();
        }
        let reopened = FileUserStore::open(path).unwrap();
        assert_eq!(
            reopened.get("skinManager.selectedSkin").as_deref(),
            Some("Ultrachromic")
        );
    }

    #[tokio::test]
    async fn test_memory_config_store() {
        let store = MemoryConfigStore::new();
        assert!(store.get("doc").await.unwrap().is_none());
        store.put("doc", &json!({"skins": []})).await.unwrap();
        assert_eq!(store.get("doc").await.unwrap(), Some(json!({"skins": []})));
        assert_eq!(store.list().await.unwrap(), vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_file_config_store_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(temp.path().join("config"));
        assert!(store.get("admin").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());

        store.put("admin", &json!({"defaultSkin": "A"})).await.unwrap();
        store.put("admin.backup.1", &json!({"enabled": false})).await.unwrap();

        assert_eq!(
            store.get("admin").await.unwrap(),
            Some(json!({"defaultSkin": "A"}))
        );
        assert_eq!(
            store.list().await.unwrap(),
            vec!["admin".to_string(), "admin.backup.1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_file_config_store_rejects_traversal() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(temp.path().to_path_buf());
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(SkinError::Config(_))
        ));
    }
}
