//! The orchestrator's unit of work and its lifecycle (spec.md §3, §4.9,
//! §4.10). Grounded on the teacher's checkpoint/session bookkeeping, with
//! `Skipped` added for DAG-scheduled descendants of a failed predecessor and
//! `AwaitingHuman` added for workflow tasks parked on a human node —
//! neither exists in the teacher, which only ever runs one agent to
//! completion or failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentMeshError;
use crate::ids;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed { result: String },
    Failed { error: TaskErrorRecord },
    /// A DAG-scheduled task whose predecessor failed; never ran.
    Skipped { reason: String },
    /// A workflow task parked at a `Human` node, waiting on
    /// [`crate::human::HumanDecision`] or the review timeout.
    AwaitingHuman { checkpoint_id: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed { .. } | TaskStatus::Failed { .. } | TaskStatus::Skipped { .. })
    }
}

/// A serializable snapshot of an [`AgentMeshError`], since the error itself
/// doesn't implement `Serialize`/`Deserialize` (its `ctx` fields are
/// reconstructible, but the variant shape is display-rendered once and
/// frozen at the point of failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskErrorRecord {
    pub message: String,
    pub task_id: Option<String>,
    pub node: Option<String>,
    pub tool: Option<String>,
    pub attempt: Option<u32>,
}

impl From<&AgentMeshError> for TaskErrorRecord {
    fn from(err: &AgentMeshError) -> Self {
        let ctx = err.context().cloned().unwrap_or_default();
        Self {
            message: err.to_string(),
            task_id: ctx.task_id,
            node: ctx.node,
            tool: ctx.tool,
            attempt: ctx.attempt,
        }
    }
}

/// What the caller asked the orchestrator to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunnerKind {
    Agent { agent: String, input: String },
    SubAgent { agent: String, input: String },
    Workflow { workflow: String, input: String },
}

/// The orchestrator's bookkeeping record for one submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub runner: RunnerKind,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Populated only for tasks submitted as part of a DAG batch; empty for
    /// directly submitted tasks.
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(runner: RunnerKind) -> Self {
        Self {
            id: ids::new_id(),
            runner,
            status: TaskStatus::Pending,
            submitted_at: ids::now(),
            started_at: None,
            finished_at: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(ids::now());
    }

    pub fn mark_completed(&mut self, result: String) {
        self.status = TaskStatus::Completed { result };
        self.finished_at = Some(ids::now());
    }

    pub fn mark_failed(&mut self, error: &AgentMeshError) {
        self.status = TaskStatus::Failed { error: error.into() };
        self.finished_at = Some(ids::now());
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped { reason: reason.into() };
        self.finished_at = Some(ids::now());
    }

    pub fn mark_awaiting_human(&mut self, checkpoint_id: impl Into<String>) {
        self.status = TaskStatus::AwaitingHuman { checkpoint_id: checkpoint_id.into() };
    }
}
