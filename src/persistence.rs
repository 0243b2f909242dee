use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const STORE_FORMAT_VERSION: u32 = 1;

/// Self-describing records keyed by item string.
pub type Records = BTreeMap<String, serde_json::Value>;

/// Outcome of restoring one namespace; skipped records were unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store {namespace}: {source}")]
    Corrupt {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn read_all(&self, namespace: &str) -> Result<Records, PersistenceError>;
    fn write_all(&self, namespace: &str, records: &Records) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, Records>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(namespace: &str, records: Records) -> Self {
        let store = Self::new();
        store.namespaces.write().insert(namespace.to_string(), records);
        store
    }
}

impl KeyValueStore for InMemoryStore {
    fn read_all(&self, namespace: &str) -> Result<Records, PersistenceError> {
        self.namespaces
            .read()
            .get(namespace)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(namespace.to_string()))
    }

    fn write_all(&self, namespace: &str, records: &Records) -> Result<(), PersistenceError> {
        self.namespaces
            .write()
            .insert(namespace.to_string(), records.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreEnvelope {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    saved_at: Option<String>,
    #[serde(default)]
    records: Records,
}

/// One JSON document per namespace under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn read_all(&self, namespace: &str) -> Result<Records, PersistenceError> {
        let path = self.path_for(namespace);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(PersistenceError::Io(e)),
        };

        let envelope: StoreEnvelope =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Corrupt {
                namespace: namespace.to_string(),
                source,
            })?;
        Ok(envelope.records)
    }

    fn write_all(&self, namespace: &str, records: &Records) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;

        let envelope = StoreEnvelope {
            version: STORE_FORMAT_VERSION,
            saved_at: Some(Utc::now().to_rfc3339()),
            records: records.clone(),
        };
        let payload = serde_json::to_vec_pretty(&envelope).map_err(PersistenceError::Serialize)?;

        // write-then-rename
        let path = self.path_for(namespace);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut records = Records::new();
        records.insert("apple".into(), serde_json::json!({"stability": 2.0}));

        store.write_all("memory_states", &records).unwrap();
        let loaded = store.read_all("memory_states").unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        assert!(matches!(
            store.read_all("memory_states"),
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory_states.json"), b"{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.read_all("memory_states"),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn in_memory_store_reports_unknown_namespace() {
        let store = InMemoryStore::new();
        assert!(store.read_all("nothing").is_err());
        store.write_all("nothing", &Records::new()).unwrap();
        assert!(store.read_all("nothing").unwrap().is_empty());
    }
}
