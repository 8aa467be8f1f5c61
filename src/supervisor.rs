//! Sub-agent supervisor (C8): a decorator over [`ToolExecutor`] that routes
//! synthetic, sub-agent-named tool calls to a freshly isolated nested agent
//! run instead of a real tool dispatch. Grounded on `tests/subagent_test.rs`'s
//! forward-looking `add_subagent` shape and `human.rs`'s
//! approval-callback-as-decorator pattern for the bridging idea.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AgentDescriptor;
use crate::engine::AgentEngine;
use crate::error::{AgentMeshError, ErrorContext};
use crate::llm::LlmCapability;
use crate::phase::AgentRunContext;
use crate::state::State;
use crate::tools::{ToolDescriptor, ToolExecutor};
use crate::trace::Tracer;

/// Characters a sub-agent's final answer is truncated to before becoming
/// the supervisor's tool result (spec.md §4.6, default per SPEC_FULL §4.6).
pub const DEFAULT_SUMMARY_BUDGET: usize = 500;

/// Recursion depth cap: sub-agents invoking other sub-agents nest at most
/// this deep before delegation is refused (spec.md §4.6).
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Routes synthetic sub-agent tool calls to isolated nested agent runs.
/// Every sub-agent gets its own fresh [`State`] seeded only with the
/// delegated task description — never a reference to the parent's state —
/// and the supervisor surfaces only a truncated summary of the sub-agent's
/// final answer back to the caller.
pub struct SubAgentSupervisor {
    roster: HashMap<String, Arc<AgentDescriptor>>,
    agent_registry: Arc<HashMap<String, Arc<AgentDescriptor>>>,
    llm: Arc<dyn LlmCapability>,
    tracer: Arc<Tracer>,
    inner: Arc<dyn ToolExecutor>,
    summary_budget: usize,
    max_depth: usize,
    depth: usize,
}

impl SubAgentSupervisor {
    /// `descriptor` is the supervising agent; its `sub_agents` list is
    /// resolved against `agent_registry` to build the roster of delegable
    /// sub-agents. `inner` handles every tool call that isn't a sub-agent
    /// name (real, server-backed tools).
    pub fn new(
        descriptor: &AgentDescriptor,
        agent_registry: Arc<HashMap<String, Arc<AgentDescriptor>>>,
        llm: Arc<dyn LlmCapability>,
        tracer: Arc<Tracer>,
        inner: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::with_depth(descriptor, agent_registry, llm, tracer, inner, 0)
    }

    fn with_depth(
        descriptor: &AgentDescriptor,
        agent_registry: Arc<HashMap<String, Arc<AgentDescriptor>>>,
        llm: Arc<dyn LlmCapability>,
        tracer: Arc<Tracer>,
        inner: Arc<dyn ToolExecutor>,
        depth: usize,
    ) -> Self {
        let roster = descriptor
            .sub_agents
            .iter()
            .filter_map(|name| agent_registry.get(name).map(|d| (name.clone(), Arc::clone(d))))
            .collect();
        Self {
            roster,
            agent_registry,
            llm,
            tracer,
            inner,
            summary_budget: DEFAULT_SUMMARY_BUDGET,
            max_depth: DEFAULT_MAX_DEPTH,
            depth,
        }
    }

    pub fn with_summary_budget(mut self, budget: usize) -> Self {
        self.summary_budget = budget;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn truncate_summary(&self, text: &str) -> String {
        if text.chars().count() <= self.summary_budget {
            text.to_string()
        } else {
            text.chars().take(self.summary_budget).collect()
        }
    }

    /// The nested tool executor a delegated sub-agent runs against: another
    /// supervisor, one level deeper, if that sub-agent itself has a roster;
    /// otherwise the same real-tool executor every level shares.
    fn nested_executor(&self, sub_descriptor: &AgentDescriptor) -> Arc<dyn ToolExecutor> {
        if sub_descriptor.sub_agents.is_empty() {
            Arc::clone(&self.inner)
        } else {
            Arc::new(Self::with_depth(
                sub_descriptor,
                Arc::clone(&self.agent_registry),
                Arc::clone(&self.llm),
                Arc::clone(&self.tracer),
                Arc::clone(&self.inner),
                self.depth + 1,
            ))
        }
    }

    async fn run_sub_agent(&self, descriptor: &Arc<AgentDescriptor>, task: &str) -> Result<String, AgentMeshError> {
        let session_id = self.tracer.start_sub_agent_session(&descriptor.name, task).await?;

        let state = State::new(descriptor.name.clone(), Some(task));
        let tool_executor = self.nested_executor(descriptor);
        let ctx = AgentRunContext::new(
            Arc::clone(descriptor),
            Arc::clone(&self.llm),
            tool_executor,
            Arc::clone(&self.tracer),
            state,
            CancellationToken::new(),
        );

        let engine = AgentEngine::new();
        let (summary, status) = match engine.run(ctx).await {
            Ok((answer, _isolated_state)) => (self.truncate_summary(&answer), "completed"),
            Err(e) => (self.truncate_summary(&format!("sub-agent failed: {e}")), "failed"),
        };

        self.tracer.end_sub_agent_session(&session_id, summary.clone(), status).await?;
        Ok(summary)
    }
}

#[async_trait]
impl ToolExecutor for SubAgentSupervisor {
    async fn execute(
        &self,
        allow_list: &HashSet<String>,
        tool_name: &str,
        args: HashMap<String, Value>,
        timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError> {
        if let Some(descriptor) = self.roster.get(tool_name) {
            if !allow_list.contains(tool_name) {
                return Err(AgentMeshError::AccessDenied {
                    tool: tool_name.to_string(),
                    ctx: ErrorContext::new().with_tool(tool_name),
                });
            }
            if self.depth >= self.max_depth {
                return Err(AgentMeshError::RecursionDepthExceeded {
                    ctx: ErrorContext::new().with_tool(tool_name).with_attempt(self.depth as u32),
                });
            }
            let task = args
                .get("task")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_default();
            return self.run_sub_agent(descriptor, &task).await;
        }

        self.inner.execute(allow_list, tool_name, args, timeout_override).await
    }

    async fn schemas_for(&self, allow_list: &HashSet<String>) -> Vec<ToolDescriptor> {
        let mut tools = self.inner.schemas_for(allow_list).await;
        for (name, descriptor) in &self.roster {
            if !allow_list.contains(name) {
                continue;
            }
            tools.push(ToolDescriptor {
                name: name.clone(),
                server: "sub-agent".to_string(),
                description: descriptor.role.clone(),
                input_schema: Some(serde_json::json!({
                    "type": "object",
                    "properties": { "task": { "type": "string" } },
                    "required": ["task"],
                })),
                output_schema: None,
                timeout: Duration::from_secs(300),
                fallback: Vec::new(),
            });
        }
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, MockLlmCaller, RequestedToolCall};
    use crate::store::MemoryStore;
    use crate::tools::ToolManager;

    fn agent(name: &str, sub_agents: Vec<String>) -> Arc<AgentDescriptor> {
        Arc::new(AgentDescriptor {
            name: name.to_string(),
            role: format!("{name} role"),
            system_prompt: "be helpful".to_string(),
            tool_allow_list: sub_agents.clone(),
            max_iterations: 3,
            model: "gpt-4".to_string(),
            temperature: 0.0,
            sub_agents,
            approval_policy: None,
        })
    }

    #[tokio::test]
    async fn sub_agent_message_sequence_never_leaks_into_parent_tool_result() {
        let tracer = Arc::new(Tracer::new("task-1", Arc::new(MemoryStore::new())));
        let inner = Arc::new(ToolManager::new(Arc::clone(&tracer)));

        let calculator = agent("calculator", vec![]);
        let mut registry = HashMap::new();
        registry.insert(calculator.name.clone(), Arc::clone(&calculator));
        let registry = Arc::new(registry);

        let supervisor_desc = agent("supervisor", vec!["calculator".to_string()]);
        let llm = Arc::new(MockLlmCaller::with_final_answer("42 is the answer, a very long elaboration follows"));

        let supervisor = SubAgentSupervisor::new(
            &supervisor_desc,
            registry,
            llm,
            tracer,
            inner as Arc<dyn ToolExecutor>,
        )
        .with_summary_budget(10);

        let allow: HashSet<String> = ["calculator".to_string()].into_iter().collect();
        let mut args = HashMap::new();
        args.insert("task".to_string(), serde_json::json!("what is 6*7"));

        let summary = supervisor.execute(&allow, "calculator", args, None).await.unwrap();
        assert_eq!(summary.chars().count(), 10);
        assert!("42 is the answer, a very long elaboration follows".starts_with(&summary));
    }

    #[tokio::test]
    async fn recursion_depth_cap_is_enforced() {
        let tracer = Arc::new(Tracer::new("task-1", Arc::new(MemoryStore::new())));
        let inner = Arc::new(ToolManager::new(Arc::clone(&tracer)));

        let leaf = agent("leaf", vec![]);
        let mut registry = HashMap::new();
        registry.insert(leaf.name.clone(), Arc::clone(&leaf));
        let registry = Arc::new(registry);

        let root_desc = agent("root", vec!["leaf".to_string()]);
        let llm = Arc::new(MockLlmCaller::with_final_answer("done"));

        let mut supervisor = SubAgentSupervisor::new(
            &root_desc,
            registry,
            llm,
            tracer,
            inner as Arc<dyn ToolExecutor>,
        );
        supervisor.depth = supervisor.max_depth;

        let allow: HashSet<String> = ["leaf".to_string()].into_iter().collect();
        let result = supervisor.execute(&allow, "leaf", HashMap::new(), None).await;
        assert!(matches!(result, Err(AgentMeshError::RecursionDepthExceeded { .. })));
    }

    #[tokio::test]
    async fn unrecognized_tool_delegates_to_inner_executor() {
        let tracer = Arc::new(Tracer::new("task-1", Arc::new(MemoryStore::new())));
        let inner = Arc::new(ToolManager::new(Arc::clone(&tracer)));
        let supervisor_desc = agent("supervisor", vec![]);
        let llm = Arc::new(MockLlmCaller::with_final_answer("n/a"));
        let supervisor = SubAgentSupervisor::new(
            &supervisor_desc,
            Arc::new(HashMap::new()),
            llm,
            tracer,
            inner as Arc<dyn ToolExecutor>,
        );

        let allow: HashSet<String> = ["search".to_string()].into_iter().collect();
        let result = supervisor.execute(&allow, "search", HashMap::new(), None).await;
        assert!(matches!(result, Err(AgentMeshError::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn schemas_for_exposes_roster_as_synthetic_tools() {
        let tracer = Arc::new(Tracer::new("task-1", Arc::new(MemoryStore::new())));
        let inner = Arc::new(ToolManager::new(Arc::clone(&tracer)));
        let calculator = agent("calculator", vec![]);
        let mut registry = HashMap::new();
        registry.insert(calculator.name.clone(), Arc::clone(&calculator));
        let supervisor_desc = agent("supervisor", vec!["calculator".to_string()]);
        let llm = Arc::new(MockLlmCaller::new(vec![]));
        let _ = ChatResponse { content: String::new(), tool_calls: Vec::<RequestedToolCall>::new(), usage: None };

        let supervisor = SubAgentSupervisor::new(
            &supervisor_desc,
            Arc::new(registry),
            llm,
            tracer,
            inner as Arc<dyn ToolExecutor>,
        );

        let allow: HashSet<String> = ["calculator".to_string()].into_iter().collect();
        let schemas = supervisor.schemas_for(&allow).await;
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "calculator");
        assert_eq!(schemas[0].server, "sub-agent");
    }
}
