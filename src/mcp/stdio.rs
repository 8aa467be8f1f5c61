//! Subprocess transport: newline-delimited JSON-RPC 2.0 over the child's
//! stdin/stdout. A background reader loop decodes stdout lines and resolves
//! pending-request futures by id; stderr is captured to the trace.

use crate::error::{AgentMeshError, ErrorContext};
use crate::mcp::types::{
    parse_jsonrpc_line, ClientInfo, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult,
};
use crate::mcp::{CallToolResult, McpTool, Transport};
use crate::trace::{Severity, Tracer};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};

pub struct StdioTransport {
    server_name: String,
    child: Mutex<Child>,
    writer: Mutex<BufWriter<ChildStdin>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
}

impl StdioTransport {
    pub fn spawn(
        server_name: impl Into<String>,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        tracer: Option<Arc<Tracer>>,
    ) -> Result<Self, AgentMeshError> {
        let server_name = server_name.into();
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentMeshError::TransportConnectionLost {
                ctx: ErrorContext::new().with_tool(format!("spawn {command}: {e}")),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| AgentMeshError::other("child has no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| AgentMeshError::other("child has no stdout"))?;
        let stderr = child.stderr.take();

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = Arc::clone(&pending);
        let reader_server = server_name.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            if let Err(e) = Self::run_reader_loop(&mut reader, reader_pending).await {
                tracing::warn!(server = %reader_server, error = %e, "stdio reader loop ended");
            }
        });

        if let Some(stderr) = stderr {
            let stderr_server = server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(server = %stderr_server, "{line}");
                    if let Some(tracer) = &tracer {
                        let _ = tracer
                            .log_step("stdio_stderr", &line, &stderr_server, Severity::Warning, vec![], 0)
                            .await;
                    }
                }
            });
        }

        Ok(Self {
            server_name,
            child: Mutex::new(child),
            writer: Mutex::new(BufWriter::new(stdin)),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    async fn run_reader_loop(
        reader: &mut BufReader<ChildStdout>,
        pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    ) -> Result<(), AgentMeshError> {
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                let mut guard = pending.lock().await;
                for (_, tx) in guard.drain() {
                    let _ = tx.send(JsonRpcResponse {
                        jsonrpc: "2.0".to_string(),
                        result: None,
                        error: Some(crate::mcp::types::JsonRpcError {
                            code: -1,
                            message: "transport closed".to_string(),
                            data: None,
                        }),
                        id: Value::Null,
                    });
                }
                return Err(AgentMeshError::TransportConnectionLost { ctx: ErrorContext::new() });
            }

            match parse_jsonrpc_line(line.trim_end()) {
                Ok(JsonRpcMessage::Response(resp)) => {
                    if let Some(id) = resp.id.as_u64() {
                        if let Some(tx) = pending.lock().await.remove(&id) {
                            let _ = tx.send(resp);
                        }
                    }
                }
                Ok(JsonRpcMessage::Request(req)) => {
                    tracing::debug!(?req, "unexpected server-to-client MCP request");
                }
                Ok(JsonRpcMessage::Notification(notif)) => {
                    tracing::debug!(?notif, "MCP notification");
                }
                Err(e) => tracing::warn!(error = %e, line = %line, "malformed JSON-RPC line"),
            }
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, AgentMeshError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: json!(id),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            let line = serde_json::to_string(&request)?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(AgentMeshError::TransportConnectionLost { ctx: ErrorContext::new() })
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(AgentMeshError::Timeout {
                    ctx: ErrorContext::new().with_tool(method),
                })
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), AgentMeshError> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        let mut writer = self.writer.lock().await;
        let line = serde_json::to_string(&notif)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn initialize(&self) -> Result<(), AgentMeshError> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": ClientInfo { name: "agentmesh".to_string(), version: "0.1.0".to_string() },
        });
        let resp = self.send_request("initialize", Some(params), Duration::from_secs(30)).await?;
        if let Some(err) = resp.error {
            return Err(AgentMeshError::other(format!("initialize failed: {}", err.message)));
        }
        self.send_notification("notifications/initialized", Some(json!({}))).await
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, AgentMeshError> {
        let resp = self.send_request("tools/list", Some(json!({})), Duration::from_secs(30)).await?;
        if let Some(err) = resp.error {
            return Err(AgentMeshError::other(format!("tools/list failed: {}", err.message)));
        }
        let result: ListToolsResult = serde_json::from_value(resp.result.unwrap_or_default())?;
        Ok(result.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<CallToolResult, AgentMeshError> {
        let params = crate::mcp::types::call_tool_params(name, &args);
        let resp = self.send_request("tools/call", Some(params), timeout).await?;
        if let Some(err) = resp.error {
            return Err(AgentMeshError::ToolExecutionFailed {
                message: err.message,
                ctx: ErrorContext::new().with_tool(name).with_node(&self.server_name),
            });
        }
        Ok(serde_json::from_value(resp.result.unwrap_or_default())?)
    }

    async fn close(&self) -> Result<(), AgentMeshError> {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        Ok(())
    }
}
