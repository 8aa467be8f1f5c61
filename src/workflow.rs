//! Directed graph workflow executor (C9): agent/tool/condition/human nodes,
//! conditional edges keyed on the state's routing key, interrupt-before
//! checkpointing, and checkpoint-based resume. Grounded on the teacher's
//! `checkpoint.rs` (checkpoint/resume half) and `states/waiting_for_human.rs`
//! (interrupt/human-node half); the node/edge graph itself follows the flat
//! lookup-table guidance of spec.md §9 rather than embedding nodes inside
//! each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{AgentDescriptor, NodeDefinition, WorkflowDefinition};
use crate::engine::AgentEngine;
use crate::error::AgentMeshError;
use crate::llm::LlmCapability;
use crate::phase::AgentRunContext;
use crate::state::{Message, MergeRegistry, State, StateDelta};
use crate::tools::ToolExecutor;
use crate::trace::{Severity, Tracer};

/// The result of one `run`/`resume` invocation: either the workflow ran to
/// completion, or it halted at an interrupt-eligible node and persisted a
/// checkpoint for the caller (the orchestrator) to resume later.
#[derive(Debug, Clone)]
pub enum WorkflowRunResult {
    Completed(State),
    Interrupted(Checkpoint),
}

/// Executes one [`WorkflowDefinition`] against a pool of known agents, a
/// shared tool executor, and an LLM capability for agent nodes.
pub struct WorkflowEngine {
    def: WorkflowDefinition,
    agents: Arc<HashMap<String, Arc<AgentDescriptor>>>,
    llm: Arc<dyn LlmCapability>,
    tool_executor: Arc<dyn ToolExecutor>,
    tracer: Arc<Tracer>,
    checkpoints: CheckpointStore,
    merge_registry: MergeRegistry,
}

impl WorkflowEngine {
    pub fn new(
        def: WorkflowDefinition,
        agents: Arc<HashMap<String, Arc<AgentDescriptor>>>,
        llm: Arc<dyn LlmCapability>,
        tool_executor: Arc<dyn ToolExecutor>,
        tracer: Arc<Tracer>,
        checkpoints: CheckpointStore,
    ) -> Result<Self, AgentMeshError> {
        def.validate()?;
        Ok(Self {
            def,
            agents,
            llm,
            tool_executor,
            tracer,
            checkpoints,
            merge_registry: MergeRegistry::default_registry(),
        })
    }

    /// Runs from the definition's entry node with a freshly seeded state.
    pub async fn run(&self, task_id: &str, initial_state: State) -> Result<WorkflowRunResult, AgentMeshError> {
        self.run_from(task_id, initial_state, self.def.entry_node.clone(), false).await
    }

    /// Resumes from a previously saved checkpoint. `feedback` is applied to
    /// the checkpoint's state via the merge registry before continuing — an
    /// empty delta makes resume transparent, matching the crate's
    /// `resume(checkpoint(X), ∅) == continue_from(X)` round-trip law. The
    /// checkpointed node itself is not re-interrupted: for a plain
    /// `interrupt_before` node this re-attempts that node's actual work with
    /// the updated state; for a human node (whose only "work" is the halt
    /// that already happened) it proceeds straight to evaluating outgoing
    /// edges.
    pub async fn resume(
        &self,
        task_id: &str,
        checkpoint: &Checkpoint,
        feedback: StateDelta,
    ) -> Result<WorkflowRunResult, AgentMeshError> {
        let merged = checkpoint.state.apply(feedback, &self.merge_registry);
        self.run_from(task_id, merged, checkpoint.current_node.clone(), true).await
    }

    async fn run_from(
        &self,
        task_id: &str,
        mut state: State,
        start: String,
        mut skip_interrupt: bool,
    ) -> Result<WorkflowRunResult, AgentMeshError> {
        let mut current = start;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > self.def.max_iterations {
                return Err(AgentMeshError::WorkflowValidation {
                    message: format!("global iteration cap ({}) exceeded at node '{current}'", self.def.max_iterations),
                });
            }

            let node = self
                .def
                .nodes
                .get(&current)
                .cloned()
                .ok_or_else(|| AgentMeshError::WorkflowValidation { message: format!("undefined node '{current}'") })?;
            let is_human = matches!(node, NodeDefinition::Human { .. });

            if !skip_interrupt && (node.interrupt_before() || is_human) {
                let checkpoint = self.checkpoints.save(task_id, &state, &current, is_human).await?;
                self.tracer
                    .log_step(&current, "checkpointed before execution", &state.current_agent, Severity::Info, vec![], 0)
                    .await?;
                return Ok(WorkflowRunResult::Interrupted(checkpoint));
            }

            // A human node has no work of its own to (re-)run on resume; its
            // only behavior is the halt that already happened above.
            if !(skip_interrupt && is_human) {
                state = self.execute_node(task_id, &current, &node, state).await?;
            }
            skip_interrupt = false;

            match self.next_node(&current, &state)? {
                Some(next) => current = next,
                None => return Ok(WorkflowRunResult::Completed(state)),
            }
        }
    }

    async fn execute_node(
        &self,
        task_id: &str,
        name: &str,
        node: &NodeDefinition,
        state: State,
    ) -> Result<State, AgentMeshError> {
        match node {
            NodeDefinition::Agent { agent, .. } => self.execute_agent_node(task_id, name, agent, state).await,
            NodeDefinition::Tool { tool, .. } => self.execute_tool_node(name, tool, state).await,
            NodeDefinition::Condition { .. } => Ok(state),
            NodeDefinition::Human { .. } => {
                unreachable!("human nodes always interrupt before reaching execute_node")
            }
        }
    }

    async fn execute_agent_node(
        &self,
        task_id: &str,
        node_name: &str,
        agent_name: &str,
        state: State,
    ) -> Result<State, AgentMeshError> {
        let descriptor = self.agents.get(agent_name).cloned().ok_or_else(|| AgentMeshError::WorkflowValidation {
            message: format!("node '{node_name}' references unknown agent '{agent_name}'"),
        })?;

        let mut delta = StateDelta::new();
        delta.current_agent = Some(agent_name.to_string());
        let seeded = state.apply(delta, &self.merge_registry);

        let ctx = AgentRunContext::new(
            descriptor,
            Arc::clone(&self.llm),
            Arc::clone(&self.tool_executor),
            Arc::clone(&self.tracer),
            seeded,
            CancellationToken::new(),
        );

        let engine = AgentEngine::new();
        let (_answer, final_state) = engine.run(ctx).await.map_err(|e| with_node(e, node_name))?;
        let _ = task_id;
        Ok(final_state)
    }

    async fn execute_tool_node(&self, node_name: &str, tool_name: &str, state: State) -> Result<State, AgentMeshError> {
        let args = state
            .metadata
            .get("tool_args")
            .and_then(|v| v.as_object())
            .map(|m| m.clone().into_iter().collect())
            .unwrap_or_default();

        let allow_list: std::collections::HashSet<String> = [tool_name.to_string()].into_iter().collect();
        let outcome = self
            .tool_executor
            .execute(&allow_list, tool_name, args, None)
            .await
            .map_err(|e| with_node(e, node_name))?;

        let message = Message::tool_result(format!("{node_name}:{tool_name}"), outcome);
        Ok(state.apply(StateDelta::new().with_messages(vec![message]), &self.merge_registry))
    }

    /// An edge with a direct `to` is always taken; a conditional edge
    /// selects by the state's `routing_key`. No outgoing edge means the
    /// workflow completes at this node.
    fn next_node(&self, current: &str, state: &State) -> Result<Option<String>, AgentMeshError> {
        let Some(edge) = self.def.edges.iter().find(|e| e.from == current) else {
            return Ok(None);
        };

        if let Some(to) = &edge.to {
            return Ok(Some(to.clone()));
        }

        if let Some(routes) = &edge.routes {
            let key = state.routing_key.as_deref().ok_or_else(|| AgentMeshError::WorkflowValidation {
                message: format!("node '{current}' has a conditional edge but state has no routing_key"),
            })?;
            return routes
                .get(key)
                .cloned()
                .map(Some)
                .ok_or_else(|| AgentMeshError::WorkflowValidation {
                    message: format!("node '{current}' conditional edge has no route for routing_key '{key}'"),
                });
        }

        Ok(None)
    }
}

fn with_node(e: AgentMeshError, node: &str) -> AgentMeshError {
    match e {
        AgentMeshError::Other { message, ctx } => AgentMeshError::Other { message, ctx: ctx.with_node(node) },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeDefinition;
    use crate::llm::MockLlmCaller;
    use crate::store::MemoryStore;
    use crate::tools::ToolManager;
    use std::collections::HashSet;

    fn agent_descriptor(name: &str) -> Arc<AgentDescriptor> {
        Arc::new(AgentDescriptor {
            name: name.to_string(),
            role: "test agent".to_string(),
            system_prompt: "be helpful".to_string(),
            tool_allow_list: vec![],
            max_iterations: 3,
            model: "gpt-4".to_string(),
            temperature: 0.0,
            sub_agents: vec![],
            approval_policy: None,
        })
    }

    fn interrupt_workflow() -> WorkflowDefinition {
        let mut nodes = HashMap::new();
        nodes.insert("plan".to_string(), NodeDefinition::Agent { agent: "planner".to_string(), interrupt_before: false });
        nodes.insert("review".to_string(), NodeDefinition::Human { interrupt_before: false });
        nodes.insert("act".to_string(), NodeDefinition::Agent { agent: "actor".to_string(), interrupt_before: false });

        WorkflowDefinition {
            name: "plan-review-act".to_string(),
            nodes,
            edges: vec![
                EdgeDefinition { from: "plan".to_string(), to: Some("review".to_string()), routes: None },
                EdgeDefinition { from: "review".to_string(), to: Some("act".to_string()), routes: None },
            ],
            entry_node: "plan".to_string(),
            checkpoints: HashSet::new(),
            max_iterations: 50,
        }
    }

    async fn engine_with(llm: Arc<dyn LlmCapability>) -> (WorkflowEngine, Arc<Tracer>) {
        let store = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("wf-task", store.clone()));
        let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
        let mut agents = HashMap::new();
        agents.insert("planner".to_string(), agent_descriptor("planner"));
        agents.insert("actor".to_string(), agent_descriptor("actor"));
        let engine = WorkflowEngine::new(
            interrupt_workflow(),
            Arc::new(agents),
            llm,
            tool_manager as Arc<dyn ToolExecutor>,
            Arc::clone(&tracer),
            CheckpointStore::new(store),
        )
        .unwrap();
        (engine, tracer)
    }

    #[tokio::test]
    async fn halts_at_human_node_with_one_checkpoint_and_no_act_step() {
        let llm = Arc::new(MockLlmCaller::with_final_answer("plan drafted"));
        let (engine, tracer) = engine_with(llm).await;

        let result = engine.run("wf-task", State::new("planner", Some("ship it"))).await.unwrap();
        let checkpoint = match result {
            WorkflowRunResult::Interrupted(cp) => cp,
            WorkflowRunResult::Completed(_) => panic!("expected an interrupt at the human review node"),
        };

        assert_eq!(checkpoint.current_node, "review");
        assert!(checkpoint.awaiting_human);
        assert_eq!(checkpoint.sequence, 0);

        let trace = tracer.snapshot().await;
        assert!(!trace.steps.iter().any(|s| s.agent == "actor"));
    }

    #[tokio::test]
    async fn resume_with_empty_feedback_continues_to_completion() {
        let llm = Arc::new(MockLlmCaller::new(vec![
            crate::llm::ScriptedReply::Response(crate::llm::ChatResponse {
                content: "plan drafted".to_string(),
                tool_calls: vec![],
                usage: None,
            }),
            crate::llm::ScriptedReply::Response(crate::llm::ChatResponse {
                content: "acted on the approved plan".to_string(),
                tool_calls: vec![],
                usage: None,
            }),
        ]));
        let (engine, _tracer) = engine_with(llm).await;

        let interrupted = engine.run("wf-task", State::new("planner", Some("ship it"))).await.unwrap();
        let checkpoint = match interrupted {
            WorkflowRunResult::Interrupted(cp) => cp,
            _ => panic!("expected interrupt"),
        };

        let result = engine.resume("wf-task", &checkpoint, StateDelta::new()).await.unwrap();
        match result {
            WorkflowRunResult::Completed(state) => {
                assert!(state.messages.iter().any(|m| m.content.contains("acted on the approved plan")));
            }
            WorkflowRunResult::Interrupted(_) => panic!("expected completion after resume"),
        }
    }

    #[tokio::test]
    async fn rejects_an_invalid_workflow_at_construction() {
        let mut wf = interrupt_workflow();
        wf.entry_node = "missing".to_string();
        let store = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("t", store.clone()));
        let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
        let llm = Arc::new(MockLlmCaller::new(vec![]));
        let result = WorkflowEngine::new(
            wf,
            Arc::new(HashMap::new()),
            llm,
            tool_manager as Arc<dyn ToolExecutor>,
            tracer,
            CheckpointStore::new(store),
        );
        assert!(matches!(result, Err(AgentMeshError::WorkflowValidation { .. })));
    }
}
