use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;

/// Selects how long persisted tokens outlive the in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPersist {
    /// Entries live only for the current process session
    Session,
    /// Entries persist until the token's own expiration elapses
    Expiration,
}

/// One storage backend behind the token store.
///
/// TTL hints are seconds until expiration, computed by the caller from the
/// token's own claims; a backend never inspects token contents.
pub trait TokenStorage: Send + Sync {
    /// Read an entry; `None` for missing or elapsed entries.
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    /// Write an entry, with an optional retention hint in seconds.
    fn set(&self, key: &str, value: &str, ttl_hint: Option<i64>) -> Result<(), AuthError>;
    /// Remove an entry; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Process-lifetime storage, the sessionStorage analogue. Entries vanish
/// with the process; TTL hints are ignored.
#[derive(Default)]
pub struct SessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStorage for SessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, _ttl_hint: Option<i64>) -> Result<(), AuthError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// File-backed storage whose entries are retained until the expiration
/// instant supplied with each write, the localStorage-with-TTL analogue.
///
/// Load and save failures degrade to in-memory-only operation for the
/// session; construction never fails.
pub struct ExpirationStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl ExpirationStorage {
    /// Open (or create) the store backing file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load token store file, starting empty"
                );
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> anyhow::Result<HashMap<String, StoredEntry>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(path)?;
        let entries: HashMap<String, StoredEntry> = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), count = entries.len(), "Loaded token store file");
        Ok(entries)
    }

    fn save(&self, entries: &HashMap<String, StoredEntry>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string(entries)?;
        fs::write(&self.path, raw).map_err(|e| anyhow!("write {}: {}", self.path.display(), e))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStorage for ExpirationStorage {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Elapsed entry reads back as absent
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl_hint: Option<i64>) -> Result<(), AuthError> {
        let expires_at = Utc::now() + Duration::seconds(ttl_hint.unwrap_or(0).max(0));
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        if let Err(e) = self.save(&entries) {
            warn!(error = %e, "Token store save failed, entry kept in memory only");
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            if let Err(e) = self.save(&entries) {
                warn!(error = %e, "Token store save failed, removal kept in memory only");
            }
        }
        Ok(())
    }
}

/// Build the backend matching a persistence mode. `store_path` is only used
/// by the expiration-scoped backend.
pub fn storage_for(persist: TokenPersist, store_path: impl AsRef<Path>) -> Box<dyn TokenStorage> {
    match persist {
        TokenPersist::Session => Box::new(SessionStorage::new()),
        TokenPersist::Expiration => Box::new(ExpirationStorage::new(store_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir().join(format!("sn-auth-test-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_session_storage_round_trip() {
        let storage = SessionStorage::new();
        assert_eq!(storage.get("sn-demo-access").unwrap(), None);

        storage.set("sn-demo-access", "head.payload", Some(300)).unwrap();
        assert_eq!(
            storage.get("sn-demo-access").unwrap().as_deref(),
            Some("head.payload")
        );

        storage.remove("sn-demo-access").unwrap();
        assert_eq!(storage.get("sn-demo-access").unwrap(), None);
    }

    #[test]
    fn test_expiration_storage_drops_elapsed_entries() {
        let path = temp_store_path();
        let storage = ExpirationStorage::new(&path);

        storage.set("live", "a", Some(600)).unwrap();
        storage.set("dead", "b", Some(-5)).unwrap();

        assert_eq!(storage.get("live").unwrap().as_deref(), Some("a"));
        assert_eq!(storage.get("dead").unwrap(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_expiration_storage_survives_reload() {
        let path = temp_store_path();
        {
            let storage = ExpirationStorage::new(&path);
            storage.set("sn-demo-refresh", "encoded", Some(3600)).unwrap();
        }

        let reopened = ExpirationStorage::new(&path);
        assert_eq!(
            reopened.get("sn-demo-refresh").unwrap().as_deref(),
            Some("encoded")
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_store_file_starts_empty() {
        let path = temp_store_path();
        fs::write(&path, "{ this is not json").unwrap();

        let storage = ExpirationStorage::new(&path);
        assert_eq!(storage.get("anything").unwrap(), None);

        let _ = fs::remove_file(&path);
    }
}
