//! Optional streaming side-channel for live observability of the agent
//! reasoning loop. Purely additive: nothing in the crate depends on a
//! caller draining this channel for correctness.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::phase::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentOutput {
    /// A new phase has started execution.
    PhaseStarted(Phase),
    /// A token of LLM output. Emitted only by capabilities that stream;
    /// the non-streaming [`crate::llm::LlmCapability`] never produces this.
    LlmToken(String),
    ToolCallStarted { name: String, args: HashMap<String, serde_json::Value> },
    ToolCallFinished { name: String, result: String, success: bool },
    FinalAnswer(String),
    Error(String),
}

pub type OutputSender = tokio::sync::mpsc::UnboundedSender<AgentOutput>;
