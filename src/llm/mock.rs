use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::AgentMeshError;
use crate::llm::{ChatResponse, LlmCapability};
use crate::state::Message;
use crate::tools::ToolDescriptor;

/// A scripted response queue for deterministic testing of the agent
/// reasoning loop, including forced `AgentMeshError::ContextLimit` results
/// to exercise the trim-and-retry recovery path.
pub enum ScriptedReply {
    Response(ChatResponse),
    Error(AgentMeshError),
}

pub struct MockLlmCaller {
    replies: Mutex<Vec<ScriptedReply>>,
    call_log: Mutex<Vec<(usize, String)>>,
}

impl MockLlmCaller {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self { replies: Mutex::new(replies), call_log: Mutex::new(Vec::new()) }
    }

    /// Convenience constructor for a caller that always returns the same
    /// plain-text final answer.
    pub fn with_final_answer(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::Response(ChatResponse {
            content: text.into(),
            tool_calls: Vec::new(),
            usage: None,
        })])
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn model_for_call(&self, n: usize) -> Option<String> {
        self.call_log.lock().unwrap().get(n).map(|(_, model)| model.clone())
    }
}

#[async_trait]
impl LlmCapability for MockLlmCaller {
    async fn chat(
        &self,
        _messages: &[Message],
        _system_prompt: &str,
        _tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<ChatResponse, AgentMeshError> {
        let mut log = self.call_log.lock().unwrap();
        let call_index = log.len();
        log.push((call_index, model.to_string()));
        drop(log);

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(AgentMeshError::other("MockLlmCaller exhausted its scripted replies"));
        }
        match replies.remove(0) {
            ScriptedReply::Response(r) => Ok(r),
            ScriptedReply::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_scripted_replies_in_order() {
        let mock = MockLlmCaller::new(vec![
            ScriptedReply::Error(AgentMeshError::ContextLimit),
            ScriptedReply::Response(ChatResponse { content: "done".to_string(), tool_calls: Vec::new(), usage: None }),
        ]);

        let first = mock.chat(&[], "sys", &[], "gpt-4").await;
        assert!(matches!(first, Err(AgentMeshError::ContextLimit)));

        let second = mock.chat(&[], "sys", &[], "gpt-4").await.unwrap();
        assert!(second.is_final());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_errors_instead_of_panicking() {
        let mock = MockLlmCaller::new(vec![]);
        let result = mock.chat(&[], "sys", &[], "gpt-4").await;
        assert!(result.is_err());
    }
}
