use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentMeshError, ErrorContext};
use crate::llm::{ChatResponse, LlmCapability};
use crate::state::Message;
use crate::tools::ToolDescriptor;

/// Default per-call LLM timeout (spec §5): a bare HTTP client has no notion
/// of "the model stopped responding", so this wrapper enforces one and
/// reports it the same way every other transient failure is reported,
/// rather than letting callers hang on a dead connection indefinitely.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Wraps any [`LlmCapability`] with a hard deadline. An elapsed deadline
/// becomes `AgentMeshError::Timeout`, which `is_transient()` already
/// reports as retryable — composing this under [`crate::llm::RetryingLlmCaller`]
/// gets automatic retry on a stalled call for free.
pub struct TimeoutLlmCaller {
    inner: Arc<dyn LlmCapability>,
    timeout: Duration,
}

impl TimeoutLlmCaller {
    pub fn new(inner: Arc<dyn LlmCapability>) -> Self {
        Self { inner, timeout: DEFAULT_LLM_TIMEOUT }
    }

    pub fn with_timeout(inner: Arc<dyn LlmCapability>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LlmCapability for TimeoutLlmCaller {
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError> {
        match tokio::time::timeout(self.timeout, self.inner.chat(messages, system_prompt, tools, model)).await {
            Ok(result) => result,
            Err(_) => Err(AgentMeshError::Timeout { ctx: ErrorContext::new() }),
        }
    }
}
