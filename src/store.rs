// =============================================================================
// Key-Value Store — pass-through persistence keyed by logical names
// =============================================================================
//
// The engine never reaches into storage during computation: the coordinator
// reads every raw series up front and writes every result afterwards.  The
// store only has to map a logical key (`raw:satellite:VALE`) to a JSON string.
//
// Two backends:
//   - MemoryStore  parking_lot RwLock<HashMap>, used by tests
//   - FileStore    one JSON file per key, atomic tmp + rename on write; the
//                  binary runs against this one
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

// =============================================================================
// Logical key layout
// =============================================================================

pub mod keys {
    pub const COLLECTION_METADATA: &str = "raw:metadata:last_collection";
    pub const ALL_FORECASTS: &str = "forecasts:all_entities";
    pub const FORECAST_METADATA: &str = "forecasts:metadata:last_forecast";
    pub const ALPHA_OPPORTUNITIES: &str = "alpha_opportunities";
    pub const SIMULATION_METADATA: &str = "simulation:metadata:last_run";
    pub const HEALTH_STATUS: &str = "system:health_status";

    pub fn raw_activity(entity: &str) -> String {
        format!("raw:satellite:{entity}")
    }

    pub fn raw_jobs(entity: &str) -> String {
        format!("raw:jobs:{entity}")
    }
}

// =============================================================================
// Trait
// =============================================================================

/// String-valued key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and decode a JSON value. Missing keys yield `Ok(None)`.
pub fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("failed to decode JSON stored under {key}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn set_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to encode JSON for {key}"))?;
    store.set(key, &raw)
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Separator used in file names in place of `:`.
const FILE_KEY_SEPARATOR: &str = "__";

/// One `<key>.json` file per key inside `root`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create store dir {}", root.display()))?;
        debug!(root = %root.display(), "file store opened");
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = key.replace(':', FILE_KEY_SEPARATOR);
        self.root.join(format!("{name}.json"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, value)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to rename {}", path.display()))?;
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable store entry");
                    continue;
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let key = name.replace(FILE_KEY_SEPARATOR, ":");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: f64,
    }

    fn exercise(store: &dyn KvStore) {
        assert!(store.get("raw:jobs:VALE").unwrap().is_none());

        let sample = Sample {
            name: "VALE".into(),
            value: 1.5,
        };
        set_json(store, "raw:jobs:VALE", &sample).unwrap();
        set_json(store, "raw:jobs:BHP", &sample).unwrap();
        set_json(store, "alpha_opportunities", &sample).unwrap();

        let loaded: Sample = get_json(store, "raw:jobs:VALE").unwrap().unwrap();
        assert_eq!(loaded, sample);

        assert_eq!(
            store.keys("raw:jobs:").unwrap(),
            vec!["raw:jobs:BHP".to_string(), "raw:jobs:VALE".to_string()]
        );

        store.set("raw:jobs:VALE", "not json").unwrap();
        assert!(get_json::<Sample>(store, "raw:jobs:VALE").is_err());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("kv")).unwrap();
        exercise(&store);
        assert!(dir.path().join("kv").join("raw__jobs__VALE.json").exists());
    }

    #[test]
    fn key_helpers() {
        assert_eq!(keys::raw_activity("RIO"), "raw:satellite:RIO");
        assert_eq!(keys::raw_jobs("RIO"), "raw:jobs:RIO");
    }
}
