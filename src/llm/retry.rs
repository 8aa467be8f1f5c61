use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AgentMeshError;
use crate::llm::{ChatResponse, LlmCapability};
use crate::state::Message;
use crate::tools::ToolDescriptor;

const DEFAULT_MAX_RETRIES: u32 = 3;

fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unauthorized") || lower.contains("invalid api key") || lower.contains("401") || lower.contains("403")
}

fn is_rate_limit_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
}

/// Wraps any [`LlmCapability`] with retry on transient failures. Auth
/// failures never retry. Rate limits wait longer than other transient
/// errors before the next attempt.
pub struct RetryingLlmCaller {
    inner: Arc<dyn LlmCapability>,
    max_retries: u32,
}

impl RetryingLlmCaller {
    pub fn new(inner: Arc<dyn LlmCapability>) -> Self {
        Self { inner, max_retries: DEFAULT_MAX_RETRIES }
    }

    pub fn with_max_retries(inner: Arc<dyn LlmCapability>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }
}

#[async_trait]
impl LlmCapability for RetryingLlmCaller {
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError> {
        let mut attempt = 0;
        loop {
            match self.inner.chat(messages, system_prompt, tools, model).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let message = e.to_string();
                    if is_auth_error(&message) {
                        return Err(e);
                    }
                    let retryable = e.is_transient() || is_rate_limit_error(&message);
                    if !retryable || attempt >= self.max_retries {
                        return Err(e);
                    }

                    let base_wait = if is_rate_limit_error(&message) { 5 } else { 1 };
                    let wait_secs = (base_wait << attempt).min(60);
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    attempt += 1;
                }
            }
        }
    }
}
