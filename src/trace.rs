//! Append-only structured event log for a task, buffered in memory and
//! flushed to the durable store after every step.

use crate::error::AgentMeshError;
use crate::ids;
use crate::store::{DurableStore, DurableStoreExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub server: String,
    pub tool: String,
    pub args: HashMap<String, serde_json::Value>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub agent: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSessionSummary {
    pub session_id: String,
    pub parent_task_id: String,
    pub agent_name: String,
    pub task: String,
    pub summary: String,
    pub status: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Trace {
    pub task_id: String,
    pub steps: Vec<StepRecord>,
    pub sub_agent_sessions: HashMap<String, SubAgentSessionSummary>,
}

impl Trace {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            steps: Vec::new(),
            sub_agent_sessions: HashMap::new(),
        }
    }

    /// Human-readable trace table, independent of the `tracing` mirror.
    pub fn pretty_print(&self) {
        println!("\n{:<6} {:<14} {:<28} {}", "step", "agent", "name", "message");
        println!("{}", "-".repeat(80));
        for s in &self.steps {
            println!(
                "{:<6} {:<14} {:<28} {}",
                s.step,
                s.agent,
                s.name,
                &s.message.chars().take(40).collect::<String>()
            );
            for tc in &s.tool_calls {
                println!("       └─ {}::{} ({} ms){}", tc.server, tc.tool, tc.duration_ms,
                    if tc.error.is_some() { " [error]" } else { "" });
            }
        }
    }
}

/// Buffers a task's [`Trace`] in memory and persists it to the durable
/// store after every mutation. The only legitimate writer of sub-agent
/// session summaries — the supervisor pushes summaries in, it never reads
/// or renders the trace itself.
pub struct Tracer {
    store: Arc<dyn DurableStore>,
    inner: Mutex<Trace>,
}

impl Tracer {
    pub fn new(task_id: impl Into<String>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(Trace::new(task_id)),
        }
    }

    async fn flush(&self, trace: &Trace) -> Result<(), AgentMeshError> {
        self.store.save_json(&trace.task_id, "trace.json", trace).await
    }

    /// Appends a step record and flushes. Returns the assigned step index.
    pub async fn log_step(
        &self,
        name: &str,
        message: &str,
        agent: &str,
        severity: Severity,
        tool_calls: Vec<ToolCallRecord>,
        duration_ms: u64,
    ) -> Result<usize, AgentMeshError> {
        let mut trace = self.inner.lock().await;
        let step = trace.steps.len();
        let record = StepRecord {
            step,
            name: name.to_string(),
            message: message.to_string(),
            timestamp: ids::now(),
            severity,
            agent: agent.to_string(),
            tool_calls,
            duration_ms,
        };
        match severity {
            Severity::Info => tracing::info!(step, agent, name, message, "agent trace"),
            Severity::Warning => tracing::warn!(step, agent, name, message, "agent trace"),
            Severity::Error => tracing::error!(step, agent, name, message, "agent trace"),
        }
        trace.steps.push(record);
        self.flush(&trace).await?;
        Ok(step)
    }

    /// Attaches a tool-call record to the most recently logged step.
    pub async fn log_tool_call(
        &self,
        server: &str,
        tool: &str,
        args: HashMap<String, serde_json::Value>,
        result: Option<String>,
        error: Option<String>,
        duration_ms: u64,
    ) -> Result<(), AgentMeshError> {
        let mut trace = self.inner.lock().await;
        tracing::info!(server, tool, duration_ms, ok = error.is_none(), "tool call");
        let record = ToolCallRecord {
            server: server.to_string(),
            tool: tool.to_string(),
            args,
            result,
            error,
            duration_ms,
        };
        if let Some(last) = trace.steps.last_mut() {
            last.tool_calls.push(record);
        } else {
            // No step logged yet this task: record a synthetic bootstrap step.
            let step = 0;
            trace.steps.push(StepRecord {
                step,
                name: "tool_call".to_string(),
                message: String::new(),
                timestamp: ids::now(),
                severity: Severity::Info,
                agent: server.to_string(),
                tool_calls: vec![record],
                duration_ms: 0,
            });
        }
        self.flush(&trace).await
    }

    pub async fn start_sub_agent_session(
        &self,
        agent_name: &str,
        task: &str,
    ) -> Result<String, AgentMeshError> {
        let mut trace = self.inner.lock().await;
        let session_id = ids::new_id();
        tracing::info!(session_id, agent_name, "sub-agent session started");
        trace.sub_agent_sessions.insert(
            session_id.clone(),
            SubAgentSessionSummary {
                session_id: session_id.clone(),
                parent_task_id: trace.task_id.clone(),
                agent_name: agent_name.to_string(),
                task: task.to_string(),
                summary: String::new(),
                status: "running".to_string(),
            },
        );
        self.flush(&trace).await?;
        Ok(session_id)
    }

    pub async fn end_sub_agent_session(
        &self,
        session_id: &str,
        summary: String,
        status: impl Into<String>,
    ) -> Result<(), AgentMeshError> {
        let mut trace = self.inner.lock().await;
        let status = status.into();
        tracing::info!(session_id, status = %status, "sub-agent session ended");
        if let Some(session) = trace.sub_agent_sessions.get_mut(session_id) {
            session.summary = summary;
            session.status = status;
        }
        self.flush(&trace).await
    }

    pub async fn pretty_print(&self) {
        self.inner.lock().await.pretty_print();
    }

    pub async fn snapshot(&self) -> Trace {
        let trace = self.inner.lock().await;
        Trace {
            task_id: trace.task_id.clone(),
            steps: trace.steps.clone(),
            sub_agent_sessions: trace.sub_agent_sessions.clone(),
        }
    }
}
