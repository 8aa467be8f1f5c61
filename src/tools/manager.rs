//! Server registry, tool discovery cache, and unified dispatch with
//! automatic tool-name correction, fallback, and retry (C6).

use crate::error::{AgentMeshError, ErrorContext};
use crate::mcp::{CallToolResult, EventStreamTransport, StdioTransport, Transport};
use crate::trace::Tracer;
use rand::Rng;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum TransportKind {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    EventStream {
        url: String,
        headers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    pub name: String,
    pub kind: TransportKind,
    pub enabled: bool,
}

/// Per-tool timeout/fallback overrides, merged into a discovered tool's
/// descriptor at registration time.
#[derive(Debug, Clone, Default)]
pub struct ToolOverride {
    pub tool_name: String,
    pub timeout_secs: Option<u64>,
    pub fallback: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub server: String,
    pub description: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub timeout: Duration,
    pub fallback: Vec<String>,
}

/// Maintains the server→transport map and the tool-name→descriptor
/// discovery cache, and dispatches `execute` calls with retry, fallback,
/// and per-agent allow-list enforcement.
pub struct ToolManager {
    tracer: Arc<Tracer>,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl ToolManager {
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            transports: RwLock::new(HashMap::new()),
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Connects to a server, performs the handshake, and caches its tools.
    pub async fn register(
        &self,
        server: ServerDescriptor,
        overrides: &[ToolOverride],
    ) -> Result<(), AgentMeshError> {
        if !server.enabled {
            return Ok(());
        }

        let transport: Arc<dyn Transport> = match &server.kind {
            TransportKind::Stdio { command, args, env } => {
                Arc::new(StdioTransport::spawn(&server.name, command, args, env, Some(Arc::clone(&self.tracer)))?)
            }
            TransportKind::EventStream { url, headers } => {
                EventStreamTransport::connect(&server.name, url.clone(), headers.clone())
            }
        };

        transport.initialize().await?;
        let discovered = transport.list_tools().await?;

        let mut tools = self.tools.write().await;
        for tool in discovered {
            let over = overrides.iter().find(|o| o.tool_name == tool.name);
            tools.push(ToolDescriptor {
                name: tool.name,
                server: server.name.clone(),
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
                output_schema: None,
                timeout: Duration::from_secs(over.and_then(|o| o.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS)),
                fallback: over.map(|o| o.fallback.clone()).unwrap_or_default(),
            });
        }
        drop(tools);

        self.transports.write().await.insert(server.name.clone(), transport);
        Ok(())
    }

    /// Automatic tool-name correction: a case-insensitive exact match if
    /// unique, else an exact match after stripping a `server::` prefix from
    /// the requested name, if unique. Any other outcome is `ToolNotFound`.
    async fn resolve_tool(&self, requested: &str) -> Result<ToolDescriptor, AgentMeshError> {
        let tools = self.tools.read().await;

        if let Some(found) = tools.iter().find(|t| t.name == requested) {
            return Ok(found.clone());
        }

        let ci_matches: Vec<&ToolDescriptor> =
            tools.iter().filter(|t| t.name.eq_ignore_ascii_case(requested)).collect();
        if ci_matches.len() == 1 {
            return Ok(ci_matches[0].clone());
        }

        if let Some((_, stripped)) = requested.split_once("::") {
            let exact: Vec<&ToolDescriptor> = tools.iter().filter(|t| t.name == stripped).collect();
            if exact.len() == 1 {
                return Ok(exact[0].clone());
            }
        }

        Err(AgentMeshError::ToolNotFound {
            tool: requested.to_string(),
            ctx: ErrorContext::new().with_tool(requested),
        })
    }

    /// Dispatches `tool_name` to its owning server, enforcing the caller's
    /// allow-list, retrying transient failures with exponential backoff and
    /// jitter, and falling through the tool's configured fallback list on
    /// exhaustion.
    pub async fn execute(
        &self,
        allow_list: &HashSet<String>,
        tool_name: &str,
        args: HashMap<String, Value>,
        timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError> {
        if !allow_list.contains(tool_name) {
            return Err(AgentMeshError::AccessDenied {
                tool: tool_name.to_string(),
                ctx: ErrorContext::new().with_tool(tool_name),
            });
        }

        let descriptor = self.resolve_tool(tool_name).await?;
        let mut chain = vec![descriptor.clone()];
        for fb in &descriptor.fallback {
            if let Ok(fb_desc) = self.resolve_tool(fb).await {
                chain.push(fb_desc);
            }
        }

        let mut last_err = None;
        for desc in chain {
            match self.execute_with_retry(&desc, &args, timeout_override).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    if !e.is_fallback_eligible() {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AgentMeshError::ToolNotFound {
            tool: tool_name.to_string(),
            ctx: ErrorContext::new(),
        }))
    }

    async fn execute_with_retry(
        &self,
        desc: &ToolDescriptor,
        args: &HashMap<String, Value>,
        timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError> {
        let timeout = timeout_override.unwrap_or(desc.timeout);
        let transports = self.transports.read().await;
        let transport = transports
            .get(&desc.server)
            .ok_or_else(|| AgentMeshError::ToolNotFound {
                tool: desc.name.clone(),
                ctx: ErrorContext::new().with_tool(&desc.name).with_node(&desc.server),
            })?
            .clone();
        drop(transports);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = std::time::Instant::now();
            let outcome = transport.call_tool(&desc.name, args.clone(), timeout).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    self.record_attempt(desc, args, &result, None, duration_ms).await;
                    if result.is_error {
                        let err = AgentMeshError::ToolExecutionFailed {
                            message: result.as_text(),
                            ctx: ErrorContext::new().with_tool(&desc.name).with_node(&desc.server).with_attempt(attempt),
                        };
                        if attempt < MAX_ATTEMPTS && err.is_transient() {
                            self.backoff(attempt).await;
                            continue;
                        }
                        return Err(err);
                    }
                    return Ok(result.as_text());
                }
                Err(e) => {
                    self.record_attempt_error(desc, args, &e, duration_ms).await;
                    if attempt < MAX_ATTEMPTS && e.is_transient() {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let base = RETRY_BASE * 2u32.pow(attempt - 1);
        let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
        let jittered = base.mul_f64(1.0 + jitter_frac);
        tokio::time::sleep(jittered).await;
    }

    async fn record_attempt(
        &self,
        desc: &ToolDescriptor,
        args: &HashMap<String, Value>,
        result: &CallToolResult,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let _ = self
            .tracer
            .log_tool_call(
                &desc.server,
                &desc.name,
                args.clone(),
                if result.is_error { None } else { Some(result.as_text()) },
                error.or_else(|| if result.is_error { Some(result.as_text()) } else { None }),
                duration_ms,
            )
            .await;
    }

    async fn record_attempt_error(
        &self,
        desc: &ToolDescriptor,
        args: &HashMap<String, Value>,
        error: &AgentMeshError,
        duration_ms: u64,
    ) {
        let _ = self
            .tracer
            .log_tool_call(&desc.server, &desc.name, args.clone(), None, Some(error.to_string()), duration_ms)
            .await;
    }

    pub async fn schemas_for(&self, allow_list: &HashSet<String>) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .await
            .iter()
            .filter(|t| allow_list.contains(&t.name))
            .cloned()
            .collect()
    }
}
