//! The single interface between the agent reasoning loop and any LLM
//! provider: chat with an optional set of tool calls.

mod anthropic;
mod mock;
mod openai;
mod retry;
mod timeout;

pub use anthropic::AnthropicCaller;
pub use mock::{MockLlmCaller, ScriptedReply};
pub use openai::OpenAiCaller;
pub use retry::RetryingLlmCaller;
pub use timeout::{TimeoutLlmCaller, DEFAULT_LLM_TIMEOUT};

use crate::budget::TokenUsage;
use crate::error::AgentMeshError;
use crate::state::{Message, Role};
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// A tool-call request parsed out of the LLM's native response format,
/// before the tool manager has resolved which server owns it.
#[derive(Debug, Clone)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub args: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    /// Empty means completion — this is the *only* signal the agent core
    /// uses to detect completion, never content heuristics.
    pub tool_calls: Vec<RequestedToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// The one capability the agent core depends on. Implementations must
/// return `AgentMeshError::ContextLimit` (not a generic failure) when the
/// provider signals a context-length error, so the agent core's trim-and-
/// retry recovery can recognize it.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError>;
}

/// Renders the conversation into the OpenAI `messages` array shape, which
/// `AnthropicCaller` also starts from (stripping the system message and
/// adapting tool-call framing separately).
pub(crate) fn build_openai_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    if !system_prompt.is_empty() {
        out.push(serde_json::json!({ "role": "system", "content": system_prompt }));
    }
    for m in messages {
        match m.role {
            Role::System => out.push(serde_json::json!({ "role": "system", "content": m.content })),
            Role::User => out.push(serde_json::json!({ "role": "user", "content": m.content })),
            Role::Assistant => {
                if let Some(tool_calls) = &m.tool_calls {
                    let oai_calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.tool,
                                    "arguments": serde_json::to_string(&tc.args).unwrap_or_default(),
                                },
                            })
                        })
                        .collect();
                    out.push(serde_json::json!({ "role": "assistant", "content": null, "tool_calls": oai_calls }));
                } else {
                    out.push(serde_json::json!({ "role": "assistant", "content": m.content }));
                }
            }
            Role::Tool => out.push(serde_json::json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id,
                "content": m.content,
            })),
        }
    }
    out
}

/// `true` if a provider error message looks like a context-length failure,
/// shared by both HTTP-backed callers so the distinction lives in one
/// place.
pub(crate) fn looks_like_context_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("context length")
        || lower.contains("maximum context length")
        || lower.contains("too many tokens")
        || lower.contains("prompt is too long")
}
