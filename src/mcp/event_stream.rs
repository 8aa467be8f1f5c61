//! Event-stream (SSE) transport. Opens a long-lived GET connection that
//! delivers server-sent events; requests are POSTed to a companion URL
//! discovered from the server's initial `endpoint` event. Responses arrive
//! as `message` events carrying JSON-RPC 2.0 payloads matched by id.
//!
//! Grounded in the SSE MCP client idiom (endpoint-discovery, POST-per-
//! request, long-lived GET for responses) and uses `eventsource-stream` for
//! SSE decoding, matching the pack's streaming-HTTP provider clients.

use crate::error::{AgentMeshError, ErrorContext};
use crate::mcp::types::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult};
use crate::mcp::{McpTool, Transport};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

const IDLE_TIMEOUT: Duration = Duration::from_secs(20);
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

struct PendingEntry {
    request: JsonRpcRequest,
    tx: oneshot::Sender<JsonRpcResponse>,
}

pub struct EventStreamTransport {
    server_name: String,
    client: reqwest::Client,
    sse_url: String,
    headers: HashMap<String, String>,
    post_url: RwLock<Option<String>>,
    endpoint_ready: Notify,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingEntry>>>,
    cancel: CancellationToken,
}

impl EventStreamTransport {
    pub fn connect(
        server_name: impl Into<String>,
        sse_url: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Arc<Self> {
        let transport = Arc::new(Self {
            server_name: server_name.into(),
            client: reqwest::Client::new(),
            sse_url: sse_url.into(),
            headers,
            post_url: RwLock::new(None),
            endpoint_ready: Notify::new(),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        });

        let worker = Arc::clone(&transport);
        tokio::spawn(async move { worker.run_connection_loop().await });

        transport
    }

    fn build_get(&self) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&self.sse_url);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }
        req
    }

    async fn run_connection_loop(self: Arc<Self>) {
        let mut backoff = RECONNECT_BASE;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.run_one_connection().await {
                Ok(()) => backoff = RECONNECT_BASE,
                Err(e) => {
                    tracing::warn!(server = %self.server_name, error = %e, "event-stream connection lost, reconnecting");
                    self.reissue_pending().await;
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, RECONNECT_MAX);
                }
            }
        }
    }

    async fn run_one_connection(&self) -> Result<(), AgentMeshError> {
        let resp = self
            .build_get()
            .send()
            .await
            .map_err(|e| AgentMeshError::TransportConnectionLost {
                ctx: ErrorContext::new().with_tool(e.to_string()),
            })?;
        let mut stream = resp.bytes_stream().eventsource();

        loop {
            let next = tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await;
            let event = match next {
                Ok(Some(Ok(ev))) => ev,
                Ok(Some(Err(e))) => {
                    return Err(AgentMeshError::TransportConnectionLost {
                        ctx: ErrorContext::new().with_tool(e.to_string()),
                    })
                }
                Ok(None) => {
                    return Err(AgentMeshError::TransportConnectionLost { ctx: ErrorContext::new() })
                }
                Err(_) => {
                    return Err(AgentMeshError::Timeout {
                        ctx: ErrorContext::new().with_tool("event-stream idle timeout"),
                    })
                }
            };

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match event.event.as_str() {
                "endpoint" => {
                    *self.post_url.write().await = Some(event.data.trim().to_string());
                    self.endpoint_ready.notify_waiters();
                }
                "ping" => {}
                _ => {
                    if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&event.data) {
                        if let Some(id) = resp.id.as_u64() {
                            if let Some(entry) = self.pending.lock().await.remove(&id) {
                                let _ = entry.tx.send(resp);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn reissue_pending(&self) {
        let pending = self.pending.lock().await;
        let requests: Vec<JsonRpcRequest> = pending
            .values()
            .map(|e| JsonRpcRequest {
                jsonrpc: e.request.jsonrpc.clone(),
                method: e.request.method.clone(),
                params: e.request.params.clone(),
                id: e.request.id.clone(),
            })
            .collect();
        drop(pending);

        let Some(post_url) = self.post_url.read().await.clone() else {
            return;
        };
        for req in requests {
            let _ = self.post(&post_url, &req).await;
        }
    }

    async fn post(&self, post_url: &str, request: &JsonRpcRequest) -> Result<(), AgentMeshError> {
        let mut req = self.client.post(post_url).json(request);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }
        req.send().await.map_err(|e| AgentMeshError::TransportConnectionLost {
            ctx: ErrorContext::new().with_tool(e.to_string()),
        })?;
        Ok(())
    }

    async fn wait_for_endpoint(&self) -> Result<String, AgentMeshError> {
        if let Some(url) = self.post_url.read().await.clone() {
            return Ok(url);
        }
        tokio::select! {
            _ = self.endpoint_ready.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                return Err(AgentMeshError::Timeout {
                    ctx: ErrorContext::new().with_tool("waiting for SSE endpoint event"),
                });
            }
        }
        self.post_url
            .read()
            .await
            .clone()
            .ok_or_else(|| AgentMeshError::TransportConnectionLost { ctx: ErrorContext::new() })
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, AgentMeshError> {
        let post_url = self.wait_for_endpoint().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: json!(id),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingEntry {
                request: JsonRpcRequest {
                    jsonrpc: request.jsonrpc.clone(),
                    method: request.method.clone(),
                    params: request.params.clone(),
                    id: request.id.clone(),
                },
                tx,
            },
        );

        self.post(&post_url, &request).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(AgentMeshError::TransportConnectionLost { ctx: ErrorContext::new() })
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(AgentMeshError::Timeout { ctx: ErrorContext::new().with_tool(method) })
            }
        }
    }
}

#[async_trait]
impl Transport for EventStreamTransport {
    async fn initialize(&self) -> Result<(), AgentMeshError> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "agentmesh", "version": "0.1.0" },
        });
        let resp = self.send_request("initialize", Some(params), Duration::from_secs(30)).await?;
        if let Some(err) = resp.error {
            return Err(AgentMeshError::other(format!("initialize failed: {}", err.message)));
        }
        Ok(())
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
        self.cancel.cancel();
        Ok(())
    }
}
