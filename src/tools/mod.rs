//! The server-backed tool manager (C6), fronting MCP transports with a
//! single `execute()` call behind a per-agent allow-list.

pub mod manager;

pub use manager::{ServerDescriptor, ToolDescriptor, ToolManager, ToolOverride, TransportKind};

use crate::error::AgentMeshError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// The interface the agent core (C7) and workflow engine (C9) dispatch
/// tool calls through. [`ToolManager`] is the concrete, server-backed
/// implementation; the sub-agent supervisor (C8) implements it too, as a
/// decorator that intercepts synthetic sub-agent tool names and delegates
/// everything else to an inner executor. Modeling this as a trait (rather
/// than a concrete-type branch) lets the supervisor compose transparently
/// without the agent core ever knowing it's there.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        allow_list: &HashSet<String>,
        tool_name: &str,
        args: HashMap<String, Value>,
        timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError>;

    async fn schemas_for(&self, allow_list: &HashSet<String>) -> Vec<ToolDescriptor>;
}

#[async_trait]
impl ToolExecutor for ToolManager {
    async fn execute(
        &self,
        allow_list: &HashSet<String>,
        tool_name: &str,
        args: HashMap<String, Value>,
        timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError> {
        ToolManager::execute(self, allow_list, tool_name, args, timeout_override).await
    }

    async fn schemas_for(&self, allow_list: &HashSet<String>) -> Vec<ToolDescriptor> {
        ToolManager::schemas_for(self, allow_list).await
    }
}
