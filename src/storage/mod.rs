//! Local key/value persistence for credentials and cached preferences.
//!
//! `TokenStore` is the only code that knows the stored key names; the REST
//! client and the CLI go through it for every read and write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ClientError, Result};
use crate::models::{User, UserSettings};

const ACCESS_TOKEN_KEY: &str = "access_token";
const USER_KEY: &str = "user";
const USER_SETTINGS_KEY: &str = "userSettings";

/// String key/value storage backend
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| ClientError::storage("lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| ClientError::storage("lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| ClientError::storage("lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every mutation
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ClientError::storage(format!("Corrupt storage file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened local storage");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| ClientError::storage("lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| ClientError::storage("lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| ClientError::storage("lock poisoned"))?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Typed accessor for the access token, the signed-in user and cached settings
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn Storage>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn Storage>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(Arc::new(FileStorage::open(path)?)))
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self.backend.get(ACCESS_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn set_access_token(&self, token: &str) -> Result<()> {
        self.backend.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn user(&self) -> Result<Option<User>> {
        self.get_json(USER_KEY)
    }

    pub fn set_user(&self, user: &User) -> Result<()> {
        self.set_json(USER_KEY, user)
    }

    /// Cached settings, or defaults when nothing has been saved yet
    pub fn settings(&self) -> Result<UserSettings> {
        Ok(self.get_json(USER_SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn set_settings(&self, settings: &UserSettings) -> Result<()> {
        self.set_json(USER_SETTINGS_KEY, settings)
    }

    /// Drops credentials; cached settings survive a logout
    pub fn clear_credentials(&self) -> Result<()> {
        self.backend.remove(ACCESS_TOKEN_KEY)?;
        self.backend.remove(USER_KEY)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable stored value");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)
    }
}
