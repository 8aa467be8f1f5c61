//! Tool protocol clients: both transports implement the same [`Transport`]
//! interface so the tool manager (C6) never branches on transport kind.

pub mod event_stream;
pub mod stdio;
pub mod types;

pub use event_stream::EventStreamTransport;
pub use stdio::StdioTransport;
pub use types::{CallToolResult, McpContent, McpTool};

use crate::error::AgentMeshError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the protocol handshake. Must be called once before any
    /// other operation.
    async fn initialize(&self) -> Result<(), AgentMeshError>;

    async fn list_tools(&self) -> Result<Vec<McpTool>, AgentMeshError>;

    async fn call_tool(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<CallToolResult, AgentMeshError>;

    /// Releases transport resources (kills the subprocess / closes the
    /// connection). Idempotent.
    async fn close(&self) -> Result<(), AgentMeshError>;
}
