//! Persisted set of active continuous modules.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use config::Storage;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Storage key for the keep-alive blob.
pub const KEEP_KEY: &str = "NTR_KeepState";

/// Ids of continuous modules currently kept on.
///
/// Persisted as `{ "<module id>": true }`; only active ids are written, so a
/// double toggle restores the stored blob exactly.
#[derive(Clone)]
pub struct KeepAliveSet {
    active: Arc<Mutex<BTreeSet<String>>>,
    storage: Arc<dyn Storage>,
}

impl KeepAliveSet {
    /// Load the set from storage. Missing or malformed data starts empty.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let set = Self {
            active: Arc::new(Mutex::new(BTreeSet::new())),
            storage,
        };
        set.reload();
        set
    }

    /// Re-read storage, replacing the in-memory set.
    pub fn reload(&self) {
        let loaded = match self.storage.get(KEEP_KEY) {
            None => BTreeSet::new(),
            Some(raw) => match serde_json::from_str::<BTreeMap<String, bool>>(&raw) {
                Ok(map) => map
                    .into_iter()
                    .filter_map(|(id, on)| on.then_some(id))
                    .collect(),
                Err(e) => {
                    warn!(
                        key = KEEP_KEY,
                        error = %e,
                        "stored keep state is malformed, starting empty"
                    );
                    BTreeSet::new()
                }
            },
        };
        debug!(active = loaded.len(), "keep state loaded");
        *self.active.lock() = loaded;
    }

    /// Flip `id` and persist. Returns the new state.
    pub fn toggle(&self, id: &str) -> bool {
        let now_active = {
            let mut active = self.active.lock();
            if active.remove(id) {
                false
            } else {
                active.insert(id.to_string());
                true
            }
        };
        info!(module = %id, active = now_active, "keep toggled");
        self.persist();
        now_active
    }

    /// True when `id` is in the active set.
    pub fn is_active(&self, id: &str) -> bool {
        self.active.lock().contains(id)
    }

    /// Snapshot of the active ids, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        self.active.lock().iter().cloned().collect()
    }

    fn persist(&self) {
        let map: BTreeMap<String, bool> = self
            .active
            .lock()
            .iter()
            .map(|id| (id.clone(), true))
            .collect();
        let json = match serde_json::to_string(&map) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode keep state");
                return;
            }
        };
        if let Err(e) = self.storage.set(KEEP_KEY, &json) {
            warn!(error = %e, "failed to persist keep state");
        }
    }
}

#[cfg(test)]
mod tests {
    use config::MemoryStorage;

    use super::*;

    #[test]
    fn double_toggle_round_trips() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(KEEP_KEY, r#"{"other":true}"#);
        let keep = KeepAliveSet::load(storage.clone());
        let before = storage.get(KEEP_KEY);

        assert!(keep.toggle("auto_retry"));
        assert!(keep.is_active("auto_retry"));
        assert!(!keep.toggle("auto_retry"));

        assert_eq!(keep.active_ids(), vec!["other".to_string()]);
        assert_eq!(storage.get(KEEP_KEY), before);
    }

    #[test]
    fn false_entries_are_inactive() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(KEEP_KEY, r#"{"a":false,"b":true}"#);
        let keep = KeepAliveSet::load(storage);
        assert_eq!(keep.active_ids(), vec!["b".to_string()]);
    }

    #[test]
    fn malformed_state_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(KEEP_KEY, "[1,2");
        let keep = KeepAliveSet::load(storage);
        assert!(keep.active_ids().is_empty());
    }

    #[test]
    fn reload_sees_external_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let keep = KeepAliveSet::load(storage.clone());
        storage.external_write(KEEP_KEY, r#"{"x":true}"#);
        keep.reload();
        assert!(keep.is_active("x"));
        assert!(!keep.toggle("x"));
        assert_eq!(storage.get(KEEP_KEY).as_deref(), Some("{}"));
    }
}
