use async_trait::async_trait;

use crate::budget::TokenUsage;
use crate::error::AgentMeshError;
use crate::llm::{looks_like_context_limit, ChatResponse, LlmCapability, RequestedToolCall};
use crate::state::{Message, Role};
use crate::tools::ToolDescriptor;

#[derive(serde::Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: Option<String>,
    tools: Vec<AnthropicToolDef>,
    messages: Vec<AnthropicMessage>,
    stream: bool,
}

#[derive(serde::Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(serde::Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },
}

pub struct AnthropicCaller {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl AnthropicCaller {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into(), api_base: "https://api.anthropic.com".to_string() }
    }

    pub fn from_env() -> Result<Self, AgentMeshError> {
        let key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AgentMeshError::other("ANTHROPIC_API_KEY not set"))?;
        Ok(Self::new(key))
    }

    fn build_tool_defs(tools: &[ToolDescriptor]) -> Vec<AnthropicToolDef> {
        tools
            .iter()
            .map(|t| AnthropicToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone().unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
            .collect()
    }

    fn build_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .filter(|m| !matches!(m.role, Role::System))
            .map(|m| match m.role {
                Role::Assistant if m.tool_calls.is_some() => {
                    let blocks: Vec<serde_json::Value> = m
                        .tool_calls
                        .as_ref()
                        .unwrap()
                        .iter()
                        .map(|tc| serde_json::json!({
                            "type": "tool_use", "id": tc.id, "name": tc.tool, "input": tc.args,
                        }))
                        .collect();
                    AnthropicMessage { role: "assistant".to_string(), content: serde_json::Value::Array(blocks) }
                }
                Role::Tool => AnthropicMessage {
                    role: "user".to_string(),
                    content: serde_json::json!([{
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id,
                        "content": m.content,
                    }]),
                },
                _ => AnthropicMessage {
                    role: if matches!(m.role, Role::User) { "user".to_string() } else { "assistant".to_string() },
                    content: serde_json::Value::String(m.content.clone()),
                },
            })
            .collect()
    }
}

#[async_trait]
impl LlmCapability for AnthropicCaller {
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError> {
        let system = if system_prompt.is_empty() { None } else { Some(system_prompt.to_string()) };

        let body = AnthropicRequest {
            model: model.to_string(),
            max_tokens: 4096,
            system,
            tools: Self::build_tool_defs(tools),
            messages: Self::build_messages(messages),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentMeshError::other(format!("network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if looks_like_context_limit(&text) {
                return Err(AgentMeshError::ContextLimit);
            }
            return Err(AgentMeshError::other(format!("Anthropic API error {status}: {text}")));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgentMeshError::other(format!("failed to parse Anthropic response: {e}")))?;

        let usage = Some(TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens));
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicContentBlock::Text { text } => content.push_str(&text),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    let args = serde_json::from_value(input)
                        .map_err(|e| AgentMeshError::other(format!("invalid tool args: {e}")))?;
                    tool_calls.push(RequestedToolCall { id, name, args });
                }
            }
        }

        Ok(ChatResponse { content, tool_calls, usage })
    }
}
