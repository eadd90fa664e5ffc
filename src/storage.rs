//! Local key-value storage and the offline activation ledger.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::{CheckoutError, Result};
use crate::models::OfflineActivation;

/// Storage keys
pub mod keys {
    pub const OFFLINE_CODES: &str = concat!("premium:", "offline_codes");
}

/// Storage adapter trait for custom storage implementations
pub trait StorageAdapter: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value by key
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value by key
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory storage adapter, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .write()
            .map_err(|_| CheckoutError::Internal("storage lock poisoned".into()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.data
            .write()
            .map_err(|_| CheckoutError::Internal("storage lock poisoned".into()))?
            .remove(key);
        Ok(())
    }
}

/// File-based storage adapter
///
/// Stores data in `premium-checkout.json` within the specified directory.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    pub const FILE_NAME: &'static str = "premium-checkout.json";

    /// Create a new file storage in the given directory.
    ///
    /// The directory must exist and be writable. An unreadable or corrupt
    /// existing file starts out empty and is overwritten on the next write.
    pub fn new(storage_dir: &Path) -> Result<Self> {
        if !storage_dir.is_dir() {
            return Err(CheckoutError::configuration(format!(
                "Storage directory {} does not exist",
                storage_dir.display()
            )));
        }

        let path = storage_dir.join(Self::FILE_NAME);

        let cache = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), "Ignoring corrupt storage file: {}", e);
                    HashMap::new()
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to read storage file: {}", e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save the cache to disk
    fn save(&self, cache: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(cache)?;
        std::fs::write(&self.path, contents).map_err(|e| {
            CheckoutError::Internal(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| CheckoutError::Internal("storage lock poisoned".into()))?;
        cache.insert(key.to_string(), value.to_string());
        self.save(&cache)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| CheckoutError::Internal("storage lock poisoned".into()))?;
        cache.remove(key);
        self.save(&cache)
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

/// Ordered list of activations that could not reach the remote store,
/// serialized as one JSON array under [`keys::OFFLINE_CODES`].
pub struct OfflineLedger {
    storage: Box<dyn StorageAdapter>,
    // Serializes read-modify-write of the blob
    append_lock: Mutex<()>,
}

impl OfflineLedger {
    pub fn new(storage: Box<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            append_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// All held records, oldest first. A corrupt blob reads as empty.
    pub fn entries(&self) -> Vec<OfflineActivation> {
        let Some(raw) = self.storage.get(keys::OFFLINE_CODES) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Offline ledger is corrupt, starting a fresh list: {}", e);
            Vec::new()
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries().iter().any(|entry| entry.code == code)
    }

    /// Whether a held record was issued for `subscription_id`.
    pub fn issued_for(&self, subscription_id: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.record.subscription_id == subscription_id)
    }

    /// Append one record, keeping earlier ones.
    pub fn append(&self, entry: OfflineActivation) -> Result<()> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| CheckoutError::Internal("offline ledger lock poisoned".into()))?;
        let mut entries = self.entries();
        entries.push(entry);
        let raw = serde_json::to_string(&entries)?;
        self.storage.set(keys::OFFLINE_CODES, &raw)
    }
}

impl std::fmt::Debug for OfflineLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineLedger")
            .field("storage", &"<storage>")
            .finish()
    }
}
