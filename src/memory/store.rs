use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use super::state::MemoryState;
pub use crate::persistence::LoadReport;
use crate::persistence::{KeyValueStore, PersistenceError, Records};

pub const MEMORY_NAMESPACE: &str = "memory_states";

/// Item key to `MemoryState`, backed by a `KeyValueStore` for durability.
pub struct MemoryStore {
    states: RwLock<HashMap<String, MemoryState>>,
    backend: Arc<dyn KeyValueStore>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub fn get(&self, key: &str) -> Option<MemoryState> {
        self.states.read().get(key).cloned()
    }

    pub fn get_or_create(&self, key: &str) -> MemoryState {
        if let Some(state) = self.states.read().get(key) {
            return state.clone();
        }
        self.states
            .write()
            .entry(key.to_string())
            .or_insert_with(|| MemoryState::new(key))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// All states ordered by key.
    pub fn snapshot(&self) -> Vec<MemoryState> {
        let mut states: Vec<MemoryState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.item.cmp(&b.item));
        states
    }

    /// Read-modify-write under one write lock. `f` computes the replacement from
    /// the current (or default) state; nothing is written if it fails.
    pub(crate) fn apply<E>(
        &self,
        key: &str,
        f: impl FnOnce(&MemoryState) -> Result<MemoryState, E>,
    ) -> Result<MemoryState, E> {
        let mut states = self.states.write();
        let current = states
            .get(key)
            .cloned()
            .unwrap_or_else(|| MemoryState::new(key));
        let next = f(&current)?;
        states.insert(key.to_string(), next.clone());
        Ok(next)
    }

    pub fn load(&self) -> LoadReport {
        let records = match self.backend.read_all(MEMORY_NAMESPACE) {
            Ok(records) => records,
            Err(PersistenceError::NotFound(path)) => {
                warn!(path = %path, "memory store not found, starting empty");
                return LoadReport::default();
            }
            Err(e) => {
                warn!(error = %e, "memory store unreadable, starting empty");
                return LoadReport::default();
            }
        };

        let mut report = LoadReport::default();
        let mut loaded = HashMap::with_capacity(records.len());
        for (key, value) in records {
            let state = serde_json::from_value::<MemoryState>(value)
                .ok()
                .and_then(|s| s.sanitized(&key));
            match state {
                Some(state) => {
                    loaded.insert(key, state);
                    report.loaded += 1;
                }
                None => {
                    warn!(item = %key, "skipping malformed memory record");
                    report.skipped += 1;
                }
            }
        }

        *self.states.write() = loaded;
        debug!(loaded = report.loaded, skipped = report.skipped, "memory store loaded");
        report
    }

    pub fn save(&self) -> Result<usize, PersistenceError> {
        let mut records = Records::new();
        for state in self.snapshot() {
            let value = serde_json::to_value(&state).map_err(PersistenceError::Serialize)?;
            records.insert(state.item.clone(), value);
        }

        let count = records.len();
        if let Err(e) = self.backend.write_all(MEMORY_NAMESPACE, &records) {
            error!(error = %e, "failed to save memory store");
            return Err(e);
        }
        debug!(count, "memory store saved");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::state::Grade;
    use crate::persistence::{InMemoryStore, JsonFileStore};
    use serde_json::json;

    #[test]
    fn get_or_create_inserts_default_once() {
        let store = MemoryStore::new(Arc::new(InMemoryStore::new()));
        assert!(store.get("apple").is_none());
        let state = store.get_or_create("apple");
        assert_eq!(state.review_count, 0);
        assert_eq!(store.len(), 1);
        store.get_or_create("apple");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_apply_leaves_state_untouched() {
        let store = MemoryStore::new(Arc::new(InMemoryStore::new()));
        let result: Result<_, &str> = store.apply("apple", |_| Err("boom"));
        assert!(result.is_err());
        assert!(store.get("apple").is_none());
    }

    #[test]
    fn load_skips_malformed_records() {
        let mut records = Records::new();
        records.insert("good".into(), json!({"stability": 3.0, "review_count": 1}));
        records.insert("bad".into(), json!({"stability": -1.0}));
        records.insert("worse".into(), json!("not an object"));
        let backend = InMemoryStore::with_records(MEMORY_NAMESPACE, records);
        let store = MemoryStore::new(Arc::new(backend));

        let report = store.load();
        assert_eq!(report, LoadReport { loaded: 1, skipped: 2 });
        assert_eq!(store.get("good").unwrap().stability, 3.0);
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(Arc::new(JsonFileStore::new(dir.path())));
        assert_eq!(store.load(), LoadReport::default());
        assert!(store.is_empty());
    }

    #[test]
    fn save_then_load_restores_states() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path()));
        let store = MemoryStore::new(backend.clone());
        store
            .apply::<()>("apple", |s| {
                let mut next = s.clone();
                next.stability = 4.5;
                next.review_count = 2;
                next.push_grade(Grade::Good);
                Ok(next)
            })
            .unwrap();
        assert_eq!(store.save().unwrap(), 1);

        let restored = MemoryStore::new(backend);
        assert_eq!(restored.load().loaded, 1);
        let state = restored.get("apple").unwrap();
        assert_eq!(state.stability, 4.5);
        assert_eq!(state.grade_history, vec![3]);
    }
}
