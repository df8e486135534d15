//! Translator workers and job queues of the two workspaces, as stored by the
//! site under `workspace-gpt` and `workspace-sakura`.
//!
//! Reads go through a per-key cache that is refreshed from storage change
//! notifications. Unknown fields are carried through unchanged.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use config::{Storage, StorageChange};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, warn};

use crate::{Error, Result};

pub const GPT_KEY: &str = "workspace-gpt";
pub const SAKURA_KEY: &str = "workspace-sakura";

/// Segment lengths given to new Sakura workers.
pub const SAKURA_SEG_LENGTH: u64 = 500;

/// Which workspace a page or job queue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workspace {
    Gpt,
    Sakura,
}

impl Workspace {
    pub fn key(self) -> &'static str {
        match self {
            Self::Gpt => GPT_KEY,
            Self::Sakura => SAKURA_KEY,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            GPT_KEY => Some(Self::Gpt),
            SAKURA_KEY => Some(Self::Sakura),
            _ => None,
        }
    }

    /// The workspace a page path shows, if any.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.contains("workspace/sakura") {
            Some(Self::Sakura)
        } else if path.contains("workspace/gpt") {
            Some(Self::Gpt)
        } else {
            None
        }
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gpt => "GPT",
            Self::Sakura => "Sakura",
        })
    }
}

/// Worker id: the site stores both strings and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerId {
    Number(i64),
    Text(String),
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    #[serde(default)]
    pub id: WorkerId,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_seg_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seg_length: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Worker {
    pub fn sakura(id: &str, endpoint: &str) -> Self {
        Self {
            id: WorkerId::Text(id.to_string()),
            endpoint: endpoint.to_string(),
            prev_seg_length: Some(SAKURA_SEG_LENGTH),
            seg_length: Some(SAKURA_SEG_LENGTH),
            kind: None,
            model: None,
            key: None,
            extra: Map::new(),
        }
    }

    pub fn gpt(id: &str, model: &str, endpoint: &str, key: &str) -> Self {
        Self {
            id: WorkerId::Text(id.to_string()),
            endpoint: endpoint.to_string(),
            prev_seg_length: None,
            seg_length: None,
            kind: Some("api".to_string()),
            model: Some(model.to_string()),
            key: Some(key.to_string()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub create_at: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of one workspace key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceData {
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub uncompleted_jobs: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkspaceData {
    /// Insert or replace the worker with the same id.
    pub fn upsert_worker(&mut self, worker: Worker) {
        match self.workers.iter_mut().find(|w| w.id == worker.id) {
            Some(slot) => *slot = worker,
            None => self.workers.push(worker),
        }
    }
}

/// Worker names for `count` workers: `prefix` alone for one, otherwise
/// `prefix1..=prefixN`.
pub fn worker_names(prefix: &str, count: u64) -> Vec<String> {
    if count <= 1 {
        vec![prefix.to_string()]
    } else {
        (1..=count).map(|i| format!("{prefix}{i}")).collect()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Cached access to the workspace keys.
pub struct WorkspaceStore {
    storage: Arc<dyn Storage>,
    cache: Mutex<HashMap<Workspace, WorkspaceData>>,
}

impl WorkspaceStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current data, from the cache or storage. Missing or malformed data
    /// reads as empty.
    pub fn load(&self, ws: Workspace) -> WorkspaceData {
        self.try_load(ws).unwrap_or_else(|e| {
            warn!(key = ws.key(), error = %e, "workspace data is malformed");
            WorkspaceData::default()
        })
    }

    /// Like [`load`](Self::load), but a stored blob that does not parse is an
    /// error. Malformed data is never cached.
    fn try_load(&self, ws: Workspace) -> Result<WorkspaceData> {
        if let Some(data) = self.cache.lock().get(&ws) {
            return Ok(data.clone());
        }
        let data = self.read(ws)?;
        self.cache.lock().insert(ws, data.clone());
        Ok(data)
    }

    fn read(&self, ws: Workspace) -> Result<WorkspaceData> {
        let Some(raw) = self.storage.get(ws.key()) else {
            return Ok(WorkspaceData::default());
        };
        serde_json::from_str(&raw).map_err(|source| Error::Workspace {
            key: ws.key(),
            source,
        })
    }

    /// Write `data` through to storage.
    pub fn save(&self, ws: Workspace, data: WorkspaceData) -> Result<()> {
        let json = serde_json::to_string(&data)?;
        self.cache.lock().insert(ws, data);
        self.storage.set(ws.key(), &json)?;
        debug!(key = ws.key(), "workspace saved");
        Ok(())
    }

    /// Load, modify and save. Fails without writing when the stored data is
    /// malformed.
    pub fn update<F>(&self, ws: Workspace, f: F) -> Result<()>
    where
        F: FnOnce(&mut WorkspaceData),
    {
        let mut data = self.try_load(ws)?;
        f(&mut data);
        self.save(ws, data)
    }

    /// Drop the cached copy and re-read storage.
    pub fn refresh(&self, ws: Workspace) -> WorkspaceData {
        self.cache.lock().remove(&ws);
        self.load(ws)
    }

    /// Apply a storage change notification to the cache.
    pub fn apply_change(&self, change: &StorageChange) {
        let Some(ws) = Workspace::from_key(&change.key) else {
            return;
        };
        let mut cache = self.cache.lock();
        match change.value.as_deref().map(serde_json::from_str::<WorkspaceData>) {
            Some(Ok(data)) => {
                cache.insert(ws, data);
            }
            Some(Err(e)) => {
                warn!(key = %change.key, error = %e, "failed to sync workspace cache");
                cache.remove(&ws);
            }
            None => {
                cache.remove(&ws);
            }
        }
    }

    /// Keep the cache in sync with storage until the storage is dropped.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.storage.subscribe();
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        let Some(store) = store.upgrade() else { return };
                        store.apply_change(&change);
                    }
                    Err(RecvError::Lagged(n)) => {
                        let Some(store) = store.upgrade() else { return };
                        debug!(skipped = n, "workspace watcher lagged");
                        store.cache.lock().clear();
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    pub fn add_sakura_workers(&self, prefix: &str, endpoint: &str, count: u64) -> Result<()> {
        self.update(Workspace::Sakura, |data| {
            for name in worker_names(prefix, count) {
                data.upsert_worker(Worker::sakura(&name, endpoint));
            }
        })
    }

    pub fn add_gpt_workers(
        &self,
        prefix: &str,
        model: &str,
        endpoint: &str,
        key: &str,
        count: u64,
    ) -> Result<()> {
        self.update(Workspace::Gpt, |data| {
            for name in worker_names(prefix, count) {
                data.upsert_worker(Worker::gpt(&name, model, endpoint, key));
            }
        })
    }

    /// Remove every worker whose id is not listed in `keep`.
    pub fn remove_workers_except(&self, ws: Workspace, keep: &[String]) -> Result<usize> {
        let mut removed = 0;
        self.update(ws, |data| {
            let before = data.workers.len();
            data.workers
                .retain(|w| keep.iter().any(|k| *k == w.id.to_string()));
            removed = before - data.workers.len();
        })?;
        Ok(removed)
    }

    pub fn clear_jobs(&self, ws: Workspace) -> Result<()> {
        self.update(ws, |data| data.jobs.clear())
    }

    /// Append jobs whose task string is not queued yet. Returns how many were
    /// added.
    pub fn add_jobs(
        &self,
        ws: Workspace,
        jobs: &[(String, String)],
        create_at: u64,
    ) -> Result<usize> {
        let mut added = 0;
        self.update(ws, |data| {
            let mut seen: HashSet<String> = data.jobs.iter().map(|j| j.task.clone()).collect();
            for (task, description) in jobs {
                if seen.insert(task.clone()) {
                    data.jobs.push(Job {
                        task: task.clone(),
                        description: description.clone(),
                        create_at,
                        extra: Map::new(),
                    });
                    added += 1;
                }
            }
        })?;
        Ok(added)
    }

    pub fn uncompleted_jobs(&self, ws: Workspace) -> Vec<Value> {
        self.load(ws).uncompleted_jobs
    }
}

#[cfg(test)]
mod tests {
    use config::MemoryStorage;
    use serde_json::json;

    use super::*;

    fn store() -> (Arc<MemoryStorage>, WorkspaceStore) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), WorkspaceStore::new(storage))
    }

    #[test]
    fn worker_names_follow_count() {
        assert_eq!(worker_names("w ", 1), vec!["w "]);
        assert_eq!(worker_names("w", 0), vec!["w"]);
        assert_eq!(worker_names("w", 3), vec!["w1", "w2", "w3"]);
    }

    #[test]
    fn add_workers_upserts() {
        let (storage, store) = store();
        store.add_sakura_workers("s", "https://a", 2).unwrap();
        store.add_sakura_workers("s", "https://b", 2).unwrap();
        let data = store.load(Workspace::Sakura);
        assert_eq!(data.workers.len(), 2);
        assert!(data.workers.iter().all(|w| w.endpoint == "https://b"));
        let raw: Value = serde_json::from_str(&storage.get(SAKURA_KEY).unwrap()).unwrap();
        assert_eq!(raw["workers"][0]["segLength"], json!(500));
        assert_eq!(raw["uncompletedJobs"], json!([]));
    }

    #[test]
    fn gpt_workers_carry_model_and_key() {
        let (_, store) = store();
        store
            .add_gpt_workers("g", "deepseek-chat", "https://api", "sk", 1)
            .unwrap();
        let w = &store.load(Workspace::Gpt).workers[0];
        assert_eq!(w.id, WorkerId::Text("g".into()));
        assert_eq!(w.kind.as_deref(), Some("api"));
        assert_eq!(w.model.as_deref(), Some("deepseek-chat"));
    }

    #[test]
    fn remove_keeps_excluded_and_unknown_fields() {
        let (storage, store) = store();
        storage.seed(
            GPT_KEY,
            &json!({
                "workers": [
                    { "id": "本机", "endpoint": "x" },
                    { "id": "t1", "endpoint": "x", "custom": 1 },
                    { "id": 7, "endpoint": "x" }
                ],
                "jobs": [],
                "uncompletedJobs": [],
                "version": 3
            })
            .to_string(),
        );
        let removed = store
            .remove_workers_except(Workspace::Gpt, &["本机".into(), "7".into()])
            .unwrap();
        assert_eq!(removed, 1);
        let raw: Value = serde_json::from_str(&storage.get(GPT_KEY).unwrap()).unwrap();
        assert_eq!(raw["workers"].as_array().unwrap().len(), 2);
        assert_eq!(raw["version"], json!(3));
    }

    #[test]
    fn add_jobs_dedups_by_task() {
        let (_, store) = store();
        let jobs = vec![
            ("web/a?x".to_string(), "a".to_string()),
            ("web/b?x".to_string(), "b".to_string()),
            ("web/a?x".to_string(), "a again".to_string()),
        ];
        assert_eq!(store.add_jobs(Workspace::Gpt, &jobs, 1).unwrap(), 2);
        assert_eq!(store.add_jobs(Workspace::Gpt, &jobs, 2).unwrap(), 0);
        let data = store.load(Workspace::Gpt);
        assert_eq!(data.jobs.len(), 2);
        assert_eq!(data.jobs[0].create_at, 1);

        store.clear_jobs(Workspace::Gpt).unwrap();
        assert!(store.load(Workspace::Gpt).jobs.is_empty());
    }

    #[test]
    fn malformed_data_reads_empty() {
        let (storage, store) = store();
        storage.seed(SAKURA_KEY, "oops");
        assert_eq!(store.load(Workspace::Sakura), WorkspaceData::default());
    }

    #[test]
    fn updates_leave_malformed_data_alone() {
        let (storage, store) = store();
        storage.seed(SAKURA_KEY, "oops");
        let jobs = vec![("web/a?x".to_string(), "a".to_string())];
        let err = store.add_jobs(Workspace::Sakura, &jobs, 1).unwrap_err();
        assert!(matches!(err, Error::Workspace { key: SAKURA_KEY, .. }));
        assert!(store.add_sakura_workers("s", "https://a", 1).is_err());
        assert_eq!(storage.get(SAKURA_KEY).as_deref(), Some("oops"));
    }

    #[test]
    fn sparse_site_entries_survive_updates() {
        let (storage, store) = store();
        storage.seed(
            GPT_KEY,
            &json!({
                "workers": [{ "id": "mine", "type": "api" }],
                "jobs": [{ "task": "web/a/b?level=normal", "createAt": 1 }]
            })
            .to_string(),
        );
        let jobs = vec![("web/c/d?level=normal".to_string(), "d".to_string())];
        assert_eq!(store.add_jobs(Workspace::Gpt, &jobs, 2).unwrap(), 1);

        let raw: Value = serde_json::from_str(&storage.get(GPT_KEY).unwrap()).unwrap();
        assert_eq!(raw["workers"][0]["id"], json!("mine"));
        assert_eq!(raw["workers"][0]["type"], json!("api"));
        assert_eq!(raw["jobs"].as_array().unwrap().len(), 2);
        assert_eq!(raw["jobs"][0]["task"], json!("web/a/b?level=normal"));
    }

    #[test]
    fn malformed_change_drops_cached_copy() {
        let (storage, store) = store();
        store.add_sakura_workers("s", "https://a", 1).unwrap();
        storage.seed(SAKURA_KEY, "oops");
        store.apply_change(&StorageChange {
            key: SAKURA_KEY.into(),
            value: Some("oops".into()),
        });
        assert!(store.clear_jobs(Workspace::Sakura).is_err());
        assert_eq!(storage.get(SAKURA_KEY).as_deref(), Some("oops"));
    }

    #[test]
    fn changes_update_cache() {
        let (storage, store) = store();
        assert!(store.load(Workspace::Gpt).workers.is_empty());
        // Written behind the cache's back.
        storage.seed(GPT_KEY, r#"{"workers":[{"id":"x","endpoint":"e"}]}"#);
        assert!(store.load(Workspace::Gpt).workers.is_empty());
        assert_eq!(store.refresh(Workspace::Gpt).workers.len(), 1);

        store.apply_change(&StorageChange {
            key: GPT_KEY.into(),
            value: Some(r#"{"workers":[]}"#.into()),
        });
        assert!(store.load(Workspace::Gpt).workers.is_empty());
    }

    #[test]
    fn workspace_from_path() {
        assert_eq!(Workspace::from_path("/workspace/gpt"), Some(Workspace::Gpt));
        assert_eq!(Workspace::from_path("/workspace/sakura"), Some(Workspace::Sakura));
        assert_eq!(Workspace::from_path("/workspace"), None);
    }
}
