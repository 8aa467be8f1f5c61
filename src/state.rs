//! Typed conversation state with per-field merge semantics.
//!
//! Renamed from the teacher's `State` (which means the agent's FSM phase,
//! see [`crate::phase`]) to avoid collision — here `State` is the
//! Message-sequence conversation record that flows through agents and
//! workflow nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A request, embedded in an assistant [`Message`], for the tool manager to
/// invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub server: String,
    pub tool: String,
    pub args: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present only on assistant messages that request tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Present only on tool-role messages, correlating back to the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            timestamp: Utc::now(),
        }
    }
}

/// The conversation-and-routing record threaded through agents and workflow
/// nodes. The `messages` sequence is append-only via the registered merger;
/// every other field is replace-on-update. Never mutated wholesale — always
/// produced by [`State::apply`] against a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub messages: Vec<Message>,
    pub next_action: Option<String>,
    pub current_agent: String,
    pub routing_key: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl State {
    /// Builds the initial state for an agent, seeding a user-role message
    /// from the optional task description.
    pub fn new(agent_name: impl Into<String>, task: Option<&str>) -> Self {
        let mut messages = Vec::new();
        if let Some(task) = task {
            messages.push(Message::user(task));
        }
        Self {
            messages,
            next_action: None,
            current_agent: agent_name.into(),
            routing_key: None,
            metadata: HashMap::new(),
        }
    }

    /// Produces a new state by applying `delta` field-by-field through the
    /// registry: fields with a registered merger are combined with the
    /// existing value, all others replace it outright.
    pub fn apply(&self, delta: StateDelta, registry: &MergeRegistry) -> State {
        let mut next = self.clone();

        if let Some(new_messages) = delta.messages {
            next.messages = match registry.get("messages") {
                Some(merger) => merger.merge_messages(&next.messages, &new_messages),
                None => new_messages,
            };
        }
        if let Some(v) = delta.next_action {
            next.next_action = v;
        }
        if let Some(v) = delta.current_agent {
            next.current_agent = v;
        }
        if let Some(v) = delta.routing_key {
            next.routing_key = v;
        }
        for (k, v) in delta.metadata {
            next.metadata.insert(k, v);
        }
        next
    }
}

/// A partial update to [`State`]. Every field is optional: omitted fields
/// are left untouched by [`State::apply`].
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub messages: Option<Vec<Message>>,
    pub next_action: Option<Option<String>>,
    pub current_agent: Option<String>,
    pub routing_key: Option<Option<String>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(Some(key.into()));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A merge strategy for the `messages` field of [`State`]. Registered
/// independently of the field name so callers can swap in a different
/// policy (e.g. a windowed merge) without touching `State::apply`.
pub trait MessageMerger: Send + Sync {
    fn merge_messages(&self, old: &[Message], new: &[Message]) -> Vec<Message>;
}

/// Order-preserving concatenation: `old ++ new`. The only merger this crate
/// ships, matching the invariant that the Message sequence is append-only.
pub struct AppendMerger;

impl MessageMerger for AppendMerger {
    fn merge_messages(&self, old: &[Message], new: &[Message]) -> Vec<Message> {
        let mut combined = Vec::with_capacity(old.len() + new.len());
        combined.extend_from_slice(old);
        combined.extend_from_slice(new);
        combined
    }
}

/// A first-class, inspectable registry mapping field name to merge
/// strategy. Kept independent of any one engine instance so workflow
/// authors and the sub-agent supervisor can build isolated registries.
#[derive(Clone)]
pub struct MergeRegistry {
    mergers: HashMap<String, Arc<dyn MessageMerger>>,
}

impl MergeRegistry {
    pub fn new() -> Self {
        Self {
            mergers: HashMap::new(),
        }
    }

    /// The default registry: `messages` merges via [`AppendMerger`], every
    /// other field replaces on update.
    pub fn default_registry() -> Self {
        let mut reg = Self::new();
        reg.register("messages", Arc::new(AppendMerger));
        reg
    }

    pub fn register(&mut self, field: impl Into<String>, merger: Arc<dyn MessageMerger>) {
        self.mergers.insert(field.into(), merger);
    }

    fn get(&self, field: &str) -> Option<&Arc<dyn MessageMerger>> {
        self.mergers.get(field)
    }
}

impl Default for MergeRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}
