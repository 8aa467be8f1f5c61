use thiserror::Error;

/// The attempt/location metadata every error carries, per the design note
/// that a free-text message alone is insufficient for the observable
/// properties of the system (spec §9 "Error carrying").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub task_id: Option<String>,
    pub node: Option<String>,
    pub tool: Option<String>,
    pub attempt: Option<u32>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// The full error taxonomy (spec §7): every fallible operation in the
/// crate returns `Result<_, AgentMeshError>` instead of ad hoc strings.
#[derive(Debug, Clone, Error)]
pub enum AgentMeshError {
    // ── Transient — retried with exponential backoff ──────────────────
    #[error("timeout waiting for response")]
    Timeout { ctx: ErrorContext },
    #[error("transport connection lost")]
    TransportConnectionLost { ctx: ErrorContext },
    #[error("rate limited")]
    RateLimited { ctx: ErrorContext },

    // ── Fallback-eligible ───────────────────────────────────────────
    #[error("tool execution failed: {message}")]
    ToolExecutionFailed { message: String, ctx: ErrorContext },

    // ── Context-length — recovered inside the agent loop ────────────
    #[error("LLM signalled a context-length error")]
    ContextLimit,
    #[error("context window exhausted after trimming to the floor")]
    ContextExhausted { ctx: ErrorContext },

    // ── Non-retryable ────────────────────────────────────────────────
    #[error("schema violation: {message}")]
    SchemaViolation { message: String, ctx: ErrorContext },
    #[error("access denied: tool '{tool}' not in the caller's allow-list")]
    AccessDenied { tool: String, ctx: ErrorContext },
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String, ctx: ErrorContext },
    #[error("cycle detected in dependency graph")]
    CycleDetected,
    #[error("workflow validation failed: {message}")]
    WorkflowValidation { message: String },
    #[error("awaiting-human review timed out")]
    AwaitingHumanTimeout { ctx: ErrorContext },
    #[error("iteration limit exhausted after {attempt} iteration(s)")]
    IterationExhausted { attempt: usize, ctx: ErrorContext },
    #[error("sub-agent recursion depth exceeded")]
    RecursionDepthExceeded { ctx: ErrorContext },
    #[error("token budget exceeded")]
    TokenBudgetExceeded { ctx: ErrorContext },

    // ── Fatal ─────────────────────────────────────────────────────────
    #[error("durable store I/O failure: {message}")]
    StoreIo { message: String },
    #[error("checkpoint corrupted: {message}")]
    Corruption { message: String },

    // ── Cancellation ──────────────────────────────────────────────────
    #[error("cancelled")]
    Cancelled { ctx: ErrorContext },

    // ── Escape hatch for library-internal plumbing errors ───────────
    #[error("{message}")]
    Other { message: String, ctx: ErrorContext },
}

impl AgentMeshError {
    /// Transient errors are retried by the tool manager / LLM caller with
    /// exponential backoff (spec §4.4, §7).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentMeshError::Timeout { .. }
                | AgentMeshError::TransportConnectionLost { .. }
                | AgentMeshError::RateLimited { .. }
        )
    }

    /// Fallback-eligible errors are retried once on the same tool, then on
    /// each fallback tool in order (spec §4.4).
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, AgentMeshError::ToolExecutionFailed { .. }) || self.is_transient()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentMeshError::Cancelled { .. })
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AgentMeshError::Timeout { ctx }
            | AgentMeshError::TransportConnectionLost { ctx }
            | AgentMeshError::RateLimited { ctx }
            | AgentMeshError::ToolExecutionFailed { ctx, .. }
            | AgentMeshError::ContextExhausted { ctx }
            | AgentMeshError::SchemaViolation { ctx, .. }
            | AgentMeshError::AccessDenied { ctx, .. }
            | AgentMeshError::ToolNotFound { ctx, .. }
            | AgentMeshError::AwaitingHumanTimeout { ctx }
            | AgentMeshError::IterationExhausted { ctx, .. }
            | AgentMeshError::RecursionDepthExceeded { ctx }
            | AgentMeshError::TokenBudgetExceeded { ctx }
            | AgentMeshError::Cancelled { ctx }
            | AgentMeshError::Other { ctx, .. } => Some(ctx),
            _ => None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        AgentMeshError::Other {
            message: message.into(),
            ctx: ErrorContext::new(),
        }
    }
}

impl From<std::io::Error> for AgentMeshError {
    fn from(err: std::io::Error) -> Self {
        AgentMeshError::StoreIo {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentMeshError {
    fn from(err: serde_json::Error) -> Self {
        AgentMeshError::Corruption {
            message: err.to_string(),
        }
    }
}
