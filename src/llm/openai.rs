use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestMessage, ChatCompletionTool,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};
use async_trait::async_trait;
use std::collections::HashMap;

use crate::budget::TokenUsage;
use crate::error::AgentMeshError;
use crate::llm::{build_openai_messages, looks_like_context_limit, ChatResponse, LlmCapability, RequestedToolCall};
use crate::state::Message;
use crate::tools::ToolDescriptor;

pub struct OpenAiCaller {
    client: Client<OpenAIConfig>,
}

impl OpenAiCaller {
    /// Standard OpenAI client using the `OPENAI_API_KEY` env var.
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Custom base URL — for Groq, Together, Ollama, Fireworks, and other
    /// OpenAI-compatible APIs.
    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_base(api_base).with_api_key(api_key);
        Self { client: Client::with_config(config) }
    }

    fn build_tools(tools: &[ToolDescriptor]) -> Vec<ChatCompletionTool> {
        tools
            .iter()
            .map(|t| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: t.name.clone(),
                    description: Some(t.description.clone()),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn parse_tool_call(tc: &ChatCompletionMessageToolCall) -> Result<RequestedToolCall, AgentMeshError> {
        let args: HashMap<String, serde_json::Value> = serde_json::from_str(&tc.function.arguments)?;
        Ok(RequestedToolCall { id: tc.id.clone(), name: tc.function.name.clone(), args })
    }
}

impl Default for OpenAiCaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmCapability for OpenAiCaller {
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError> {
        let messages_json = build_openai_messages(system_prompt, messages);
        let oai_messages: Vec<ChatCompletionRequestMessage> =
            serde_json::from_value(serde_json::Value::Array(messages_json))?;

        let oai_tools = Self::build_tools(tools);
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(model).messages(oai_messages);
        if !oai_tools.is_empty() {
            request_builder.tools(oai_tools);
        }
        let request = request_builder
            .build()
            .map_err(|e| AgentMeshError::other(format!("failed to build OpenAI request: {e}")))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            let msg = e.to_string();
            if looks_like_context_limit(&msg) {
                AgentMeshError::ContextLimit
            } else {
                AgentMeshError::other(format!("OpenAI API error: {msg}"))
            }
        })?;

        let usage = response.usage.map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentMeshError::other("empty response from OpenAI"))?;
        let message = choice.message;

        let mut tool_calls = Vec::new();
        if let Some(raw_calls) = message.tool_calls {
            for tc in &raw_calls {
                tool_calls.push(Self::parse_tool_call(tc)?);
            }
        }

        Ok(ChatResponse { content: message.content.unwrap_or_default(), tool_calls, usage })
    }
}
