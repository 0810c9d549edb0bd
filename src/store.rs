//! Persistent key-value store and the capped analysis history
//!
//! The core only needs flat `key -> JSON` access. [`JsonFileStore`] keeps all
//! keys in one JSON object on disk; [`MemoryStore`] is used by tests and by
//! sessions that should not persist anything.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::detect::NetworkTag;
use crate::{Error, Result};

/// Store key of the history list
pub const HISTORY_KEY: &str = "analysis_history";

/// Store key of the most recently analysed address
pub const LAST_TOKEN_KEY: &str = "last_token";

/// Flat JSON key-value capability
pub trait KeyValueStore: Send + Sync {
    /// Read a key
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a key
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Single-file JSON store
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never see a half-written document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::Store(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
        } else {
            debug!(path = %path.display(), "Store file does not exist yet");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// File backing this store
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            if let Err(e) = fs::set_permissions(&self.path, perms) {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to restrict store file permissions"
                );
            }
        }
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Analysed address
    pub address: String,
    /// Token name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token symbol, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Network of the address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkTag>,
    /// When the analysis completed
    pub analysed_at: DateTime<Utc>,
}

/// Most-recent-first list of analysed addresses, de-duplicated by address
#[derive(Clone)]
pub struct History {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl History {
    /// Create a history over `store`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// Stored entries, most recent first.
    ///
    /// A corrupted list reads as empty; it is replaced on the next record.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let Some(value) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(value) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable history");
                Ok(Vec::new())
            }
        }
    }

    /// Put `entry` at the front, dropping older entries for the same address
    pub fn record(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.entries()?;
        entries.retain(|e| !NetworkTag::same_address(&e.address, &entry.address));

        self.store
            .set(LAST_TOKEN_KEY, Value::String(entry.address.clone()))?;
        entries.insert(0, entry);
        entries.truncate(self.capacity);

        self.store
            .set(HISTORY_KEY, serde_json::to_value(&entries)?)?;
        info!(size = entries.len(), "History updated");
        Ok(entries)
    }

    /// Address of the most recent analysis
    pub fn last_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(LAST_TOKEN_KEY)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.store.set(HISTORY_KEY, Value::Array(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(address: &str) -> HistoryEntry {
        HistoryEntry {
            address: address.to_string(),
            name: Some(format!("{address} token")),
            symbol: None,
            network: Some(NetworkTag::Solana),
            analysed_at: Utc::now(),
        }
    }

    fn addresses(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.address.as_str()).collect()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", serde_json::json!({"a": 1})).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("settings", serde_json::json!({"enabled": true})).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("settings").unwrap(),
            Some(serde_json::json!({"enabled": true}))
        );
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = JsonFileStore::open(blocker.join("store.json")).unwrap();
        assert!(store.set("k", serde_json::json!(1)).is_err());
        assert!(store.get("k").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        JsonFileStore::open(&path)
            .unwrap()
            .set("k", serde_json::json!(1))
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(Error::Store(_))));
    }

    #[test]
    fn test_history_most_recent_first_and_capped() {
        let history = History::new(Arc::new(MemoryStore::new()), 10);
        for i in 0..12 {
            history.record(entry(&format!("addr{i}"))).unwrap();
        }

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].address, "addr11");
        assert_eq!(entries[9].address, "addr2");
    }

    #[test]
    fn test_history_dedup_moves_to_front() {
        const EVM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
        const LOWER: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
        const OTHER: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

        let history = History::new(Arc::new(MemoryStore::new()), 10);
        history.record(entry(EVM)).unwrap();
        history.record(entry(OTHER)).unwrap();
        let entries = history.record(entry(LOWER)).unwrap();

        assert_eq!(addresses(&entries), vec![LOWER, OTHER]);
        assert_eq!(history.last_token().unwrap().as_deref(), Some(LOWER));
    }

    #[test]
    fn test_history_keeps_case_distinct_mints() {
        const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
        let lower = MINT.to_lowercase();

        let history = History::new(Arc::new(MemoryStore::new()), 10);
        history.record(entry(MINT)).unwrap();
        let entries = history.record(entry(&lower)).unwrap();

        assert_eq!(addresses(&entries), vec![lower.as_str(), MINT]);
    }

    #[test]
    fn test_history_survives_corruption() {
        let store = Arc::new(MemoryStore::new());
        store.set(HISTORY_KEY, serde_json::json!("oops")).unwrap();
        let history = History::new(store, 10);

        assert!(history.entries().unwrap().is_empty());
        history.record(entry("x")).unwrap();
        assert_eq!(history.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_history_clear() {
        let history = History::new(Arc::new(MemoryStore::new()), 3);
        history.record(entry("x")).unwrap();
        history.clear().unwrap();
        assert!(history.entries().unwrap().is_empty());
    }
}
