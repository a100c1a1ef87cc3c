//! JSON file store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Persistent store backed by a single JSON object on disk.
///
/// Every write rewrites the file through a sibling temp file and a rename, so
/// a crash never leaves a half-written store behind.
#[derive(Clone, Debug)]
pub struct DiskStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored entry, for inspection.
    pub async fn entries(&self) -> Result<Map<String, Value>> {
        let payload = match tokio::fs::read_to_string(&self.path).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(error) => return Err(error.into()),
        };
        if payload.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&payload)? {
            Value::Object(entries) => Ok(entries),
            _ => Err(Error::Storage(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, entries: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(&Value::Object(entries))?;
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn update(&self, change: impl FnOnce(&mut Map<String, Value>) -> bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        if change(&mut entries) {
            self.write_all(entries).await?;
        }
        Ok(())
    }
}

impl KeyValueStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn clear(&self) -> Result<()> {
        self.update(|entries| {
            entries.clear();
            true
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = DiskStore::new(&path);
        store.set("cursor", json!("evt-4")).await.unwrap();
        store.set("count", json!(2)).await.unwrap();

        let reopened = DiskStore::new(&path);
        assert_eq!(reopened.get("cursor").await.unwrap(), Some(json!("evt-4")));
        assert_eq!(reopened.get("count").await.unwrap(), Some(json!(2)));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("anything").await.unwrap(), None);
        store.remove("anything").await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path().join("store.json"));
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));

        store.clear().await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_non_object_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let error = DiskStore::new(&path).get("a").await.unwrap_err();
        assert!(matches!(error, Error::Storage(_)));
    }
}
