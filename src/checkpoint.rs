//! Immutable, append-only workflow checkpoints (spec.md §3, §4.7). Grounded
//! on the teacher's `FileCheckpointStore`/`AgentCheckpoint` shape, rebuilt
//! around the generic [`crate::store::DurableStore`] and the
//! `tasks/<id>/checkpoint_NNNN.json` layout of spec.md §6 rather than a
//! bespoke per-session file or a `rusqlite` backend (dropped — see
//! DESIGN.md).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentMeshError;
use crate::ids;
use crate::state::State;
use crate::store::{DurableStore, DurableStoreExt};

/// An immutable, numbered snapshot of a task's [`State`] and current
/// workflow position. Checkpoints are never modified; only new ones are
/// appended, with strictly increasing, gap-free sequence numbers per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub task_id: String,
    pub state: State,
    pub current_node: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub awaiting_human: bool,
}

/// Persists and loads [`Checkpoint`]s for a task through a [`DurableStore`].
/// The sequence number is derived from the highest `checkpoint_NNNN.json`
/// already on disk, so it survives process restarts.
pub struct CheckpointStore {
    store: Arc<dyn DurableStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Appends a new checkpoint for `task_id`. Never overwrites a prior
    /// checkpoint file.
    pub async fn save(
        &self,
        task_id: &str,
        state: &State,
        current_node: &str,
        awaiting_human: bool,
    ) -> Result<Checkpoint, AgentMeshError> {
        let file = self.store.next_checkpoint_name(task_id).await?;
        let sequence = parse_sequence(&file)?;
        let checkpoint = Checkpoint {
            id: ids::new_id(),
            task_id: task_id.to_string(),
            state: state.clone(),
            current_node: current_node.to_string(),
            sequence,
            timestamp: ids::now(),
            awaiting_human,
        };
        self.store.save_json(task_id, &file, &checkpoint).await?;
        Ok(checkpoint)
    }

    /// All checkpoints for a task, in strictly increasing sequence order.
    /// A file that fails to deserialize is a corruption, not a silent skip.
    pub async fn list(&self, task_id: &str) -> Result<Vec<Checkpoint>, AgentMeshError> {
        let mut files: Vec<String> = self
            .store
            .list_files(task_id)
            .await?
            .into_iter()
            .filter(|f| f.starts_with("checkpoint_") && f.ends_with(".json"))
            .collect();
        files.sort();

        let mut out = Vec::with_capacity(files.len());
        for file in files {
            match self.store.load_json::<Checkpoint>(task_id, &file).await? {
                Some(cp) => out.push(cp),
                None => {
                    return Err(AgentMeshError::Corruption {
                        message: format!("checkpoint file '{file}' vanished between list and load"),
                    })
                }
            }
        }
        Ok(out)
    }

    pub async fn latest(&self, task_id: &str) -> Result<Option<Checkpoint>, AgentMeshError> {
        Ok(self.list(task_id).await?.into_iter().last())
    }

    pub async fn load_by_id(&self, task_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>, AgentMeshError> {
        Ok(self.list(task_id).await?.into_iter().find(|cp| cp.id == checkpoint_id))
    }
}

fn parse_sequence(file: &str) -> Result<u64, AgentMeshError> {
    file.strip_prefix("checkpoint_")
        .and_then(|s| s.strip_suffix(".json"))
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| AgentMeshError::Corruption {
            message: format!("malformed checkpoint filename: {file}"),
        })
}
