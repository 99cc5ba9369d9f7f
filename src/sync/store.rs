use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Keys of the local preference store. Every value is a plain string;
/// structured values are JSON-encoded.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const TASKS: &str = "tasks";
    pub const THEME: &str = "theme";
    pub const OFFLINE_MODE: &str = "offlineMode";
    pub const NFC_ENABLED: &str = "nfcEnabled";
}

/// Async string key-value store persisted by the host.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Read and decode a JSON value. A value that no longer decodes is treated
/// as absent.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn PreferenceStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("Ignoring undecodable value under '{}': {}", key, e);
            Ok(None)
        }
    }
}

pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn PreferenceStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| Error::Storage(e.to_string()))?;
    store.set(key, &raw).await
}

pub async fn session_token(store: &dyn PreferenceStore) -> Result<Option<String>> {
    Ok(store.get(keys::TOKEN).await?.filter(|t| !t.is_empty()))
}

/// Volatile store, for tests and for sessions that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("preference store lock poisoned".into()))
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous contents intact.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current entries. A file that does not parse is moved aside to
    /// `*.corrupt` and the store starts over empty.
    async fn read_all(&self) -> Result<HashMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                log::warn!(
                    "Preferences file {} is corrupt ({}), moving it to {}",
                    self.path.display(),
                    e,
                    aside.display()
                );
                if let Err(e) = tokio::fs::rename(&self.path, &aside).await {
                    log::warn!("Failed to move corrupt preferences aside: {}", e);
                }
                Ok(HashMap::new())
            }
        }
    }

    async fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        f(&mut entries);
        self.write_all(&entries).await
    }
}

#[async_trait]
impl PreferenceStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.update(move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
