//! Durable storage abstraction over the persisted task layout:
//! `tasks/<task-id>/{task.json,trace.json,checkpoint_NNN.json,state.json}`.
//!
//! Writes are atomic (temp file + rename) and serialized per task id so a
//! crash never leaves a half-written file behind and two writers for the
//! same task never interleave.

use crate::error::AgentMeshError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Abstracts the task-keyed, file-named persisted layout over any
/// key→bytes backend. Callers that want typed access should use the
/// `save_json`/`load_json` extension methods below rather than hand-rolling
/// serialization at every call site.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn put(&self, task_id: &str, file: &str, bytes: Vec<u8>) -> Result<(), AgentMeshError>;

    async fn get(&self, task_id: &str, file: &str) -> Result<Option<Vec<u8>>, AgentMeshError>;

    /// Names of the files persisted for a task, e.g. `["task.json",
    /// "checkpoint_0000.json", "state.json"]`.
    async fn list_files(&self, task_id: &str) -> Result<Vec<String>, AgentMeshError>;

    async fn list_tasks(&self) -> Result<Vec<String>, AgentMeshError>;
}

/// Convenience helpers built on top of [`DurableStore::put`]/`get` for the
/// common case of storing a serde type as pretty JSON.
#[async_trait]
pub trait DurableStoreExt: DurableStore {
    async fn save_json<T: Serialize + Sync>(
        &self,
        task_id: &str,
        file: &str,
        value: &T,
    ) -> Result<(), AgentMeshError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put(task_id, file, bytes).await
    }

    async fn load_json<T: DeserializeOwned>(
        &self,
        task_id: &str,
        file: &str,
    ) -> Result<Option<T>, AgentMeshError> {
        match self.get(task_id, file).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The next sequential checkpoint file name for a task, derived from the
    /// highest `checkpoint_NNNN.json` already present.
    async fn next_checkpoint_name(&self, task_id: &str) -> Result<String, AgentMeshError> {
        let files = self.list_files(task_id).await?;
        let next = files
            .iter()
            .filter_map(|f| f.strip_prefix("checkpoint_")?.strip_suffix(".json"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(0);
        Ok(format!("checkpoint_{next:04}.json"))
    }
}

impl<T: DurableStore + ?Sized> DurableStoreExt for T {}

/// Reference implementation: one directory per task under `base_dir`, one
/// file per artifact, atomic via a temp file renamed into place. A
/// per-task-id mutex serializes concurrent writers; reads are lock-free.
pub struct FileStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.base_dir.join("tasks").join(task_id)
    }

    async fn lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AgentMeshError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn put(&self, task_id: &str, file: &str, bytes: Vec<u8>) -> Result<(), AgentMeshError> {
        let lock = self.lock_for(task_id).await;
        let _guard = lock.lock().await;
        let path = self.task_dir(task_id).join(file);
        Self::atomic_write(&path, &bytes).await
    }

    async fn get(&self, task_id: &str, file: &str) -> Result<Option<Vec<u8>>, AgentMeshError> {
        let path = self.task_dir(task_id).join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, task_id: &str) -> Result<Vec<String>, AgentMeshError> {
        let dir = self.task_dir(task_id);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(".tmp") {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn list_tasks(&self) -> Result<Vec<String>, AgentMeshError> {
        let dir = self.base_dir.join("tasks");
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

/// An in-memory store for tests and short-lived orchestrator runs.
#[derive(Default)]
pub struct MemoryStore {
    files: std::sync::Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, task_id: &str, file: &str, bytes: Vec<u8>) -> Result<(), AgentMeshError> {
        let mut files = self.files.lock().unwrap();
        files
            .entry(task_id.to_string())
            .or_default()
            .insert(file.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, task_id: &str, file: &str) -> Result<Option<Vec<u8>>, AgentMeshError> {
        let files = self.files.lock().unwrap();
        Ok(files.get(task_id).and_then(|m| m.get(file)).cloned())
    }

    async fn list_files(&self, task_id: &str) -> Result<Vec<String>, AgentMeshError> {
        let files = self.files.lock().unwrap();
        let mut names: Vec<String> = files
            .get(task_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn list_tasks(&self) -> Result<Vec<String>, AgentMeshError> {
        let files = self.files.lock().unwrap();
        let mut ids: Vec<String> = files.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrips_json() {
        let store = MemoryStore::new();
        store.save_json("t1", "task.json", &serde_json::json!({"a": 1})).await.unwrap();
        let loaded: serde_json::Value = store.load_json("t1", "task.json").await.unwrap().unwrap();
        assert_eq!(loaded["a"], 1);
        assert_eq!(store.list_files("t1").await.unwrap(), vec!["task.json".to_string()]);
    }

    #[tokio::test]
    async fn file_store_roundtrips_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("t1", "task.json", b"{}".to_vec()).await.unwrap();
        store.put("t1", "checkpoint_0000.json", b"{}".to_vec()).await.unwrap();
        let next = store.next_checkpoint_name("t1").await.unwrap();
        assert_eq!(next, "checkpoint_0001.json");
        assert_eq!(store.list_tasks().await.unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get("nope", "task.json").await.unwrap().is_none());
    }
}
