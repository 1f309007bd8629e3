//! Persistent lookup of accessory pairings
//!
//! Pair-Setup writes entries, Pair-Verify reads them back, and pairing
//! administration may delete them. The trait leaves the medium open; the
//! file implementation keeps a JSON document and replaces it atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::types::AccessoryPairing;

/// Pairing store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Abstract pairing persistence keyed by accessory device-id
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Load the pairing for a device, if present
    async fn load(&self, device_id: &str) -> Result<Option<AccessoryPairing>, StoreError>;

    /// Save (or replace) a pairing
    async fn save(&self, pairing: AccessoryPairing) -> Result<(), StoreError>;

    /// Remove the pairing for a device
    async fn remove(&self, device_id: &str) -> Result<(), StoreError>;

    /// List all stored pairings
    async fn list(&self) -> Result<Vec<AccessoryPairing>, StoreError>;
}

/// In-memory pairing store (non-persistent)
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, AccessoryPairing>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn load(&self, device_id: &str) -> Result<Option<AccessoryPairing>, StoreError> {
        Ok(self.entries.lock().await.get(device_id).cloned())
    }

    async fn save(&self, pairing: AccessoryPairing) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(pairing.device_id.clone(), pairing);
        Ok(())
    }

    async fn remove(&self, device_id: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(device_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AccessoryPairing>, StoreError> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }
}

/// File-backed pairing store
///
/// The whole document is rewritten on every change: serialize, write to a
/// sibling temp file, rename over the original. Readers therefore never
/// observe a torn document.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, AccessoryPairing>>,
}

impl FileStore {
    /// Open a store, loading any existing document
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or an
    /// existing document cannot be parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cache = Self::load_document(&path).await?;

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    async fn load_document(path: &Path) -> Result<HashMap<String, AccessoryPairing>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &HashMap<String, AccessoryPairing>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PairingStore for FileStore {
    async fn load(&self, device_id: &str) -> Result<Option<AccessoryPairing>, StoreError> {
        Ok(self.cache.lock().await.get(device_id).cloned())
    }

    async fn save(&self, pairing: AccessoryPairing) -> Result<(), StoreError> {
        let mut entries = self.cache.lock().await;
        entries.insert(pairing.device_id.clone(), pairing);
        self.persist(&entries).await
    }

    async fn remove(&self, device_id: &str) -> Result<(), StoreError> {
        let mut entries = self.cache.lock().await;
        entries.remove(device_id);
        self.persist(&entries).await
    }

    async fn list(&self) -> Result<Vec<AccessoryPairing>, StoreError> {
        Ok(self.cache.lock().await.values().cloned().collect())
    }
}
