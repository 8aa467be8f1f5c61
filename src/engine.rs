//! Drives one agent's reasoning loop: repeatedly resolves the current
//! [`Phase`]'s handler, looks up the next phase in the transition table, and
//! persists state after every mutation until a terminal phase is reached.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AgentMeshError;
use crate::phase::{self, AgentRunContext, Phase, PhaseEvent, PhaseHandler, TransitionTable};
use crate::state::State;
use crate::store::{DurableStore, DurableStoreExt};

/// Safety multiplier over `max_iterations` bounding total phase
/// transitions, guarding against a transition-table bug looping forever
/// without ever hitting the iteration cap in Planning.
const SAFETY_MULTIPLIER: usize = 6;

pub struct AgentEngine {
    transitions: TransitionTable,
    handlers: HashMap<Phase, Box<dyn PhaseHandler>>,
    store: Option<Arc<dyn DurableStore>>,
    task_id: Option<String>,
}

impl AgentEngine {
    pub fn new() -> Self {
        Self {
            transitions: phase::build_transition_table(),
            handlers: phase::default_handlers(),
            store: None,
            task_id: None,
        }
    }

    /// Enables durable persistence of `ctx.state` to `tasks/<task_id>/state.json`
    /// after every phase transition.
    pub fn with_persistence(mut self, store: Arc<dyn DurableStore>, task_id: impl Into<String>) -> Self {
        self.store = Some(store);
        self.task_id = Some(task_id.into());
        self
    }

    /// Runs the loop to completion. On success, returns the final answer
    /// text and the authoritative (untrimmed) [`State`]. On failure, returns
    /// the error the Planning/Acting phase recorded.
    pub async fn run(&self, mut ctx: AgentRunContext) -> Result<(String, State), AgentMeshError> {
        let safety_cap = ctx.descriptor.max_iterations.max(1) * SAFETY_MULTIPLIER;
        let mut current = Phase::Idle;
        let mut transitions_seen = 0;

        loop {
            transitions_seen += 1;
            if transitions_seen > safety_cap {
                return Err(AgentMeshError::IterationExhausted {
                    attempt: ctx.iteration,
                    ctx: crate::error::ErrorContext::new().with_task(ctx.state.current_agent.as_str()),
                });
            }

            if current.is_terminal() {
                return match current {
                    Phase::Done => Ok((ctx.final_answer.clone().unwrap_or_default(), ctx.state)),
                    Phase::Error => Err(ctx.failure.clone().unwrap_or_else(|| AgentMeshError::other("agent failed with no recorded error"))),
                    _ => unreachable!("is_terminal only true for Done/Error"),
                };
            }

            let handler = self
                .handlers
                .get(&current)
                .ok_or_else(|| AgentMeshError::other(format!("no phase handler registered for {current}")))?;

            let event = handler.handle(&mut ctx).await;

            if let Some(store) = &self.store {
                if let Some(task_id) = &self.task_id {
                    store.save_json(task_id, "state.json", &ctx.state).await?;
                }
            }

            current = self.transitions.get(&(current, event)).copied().unwrap_or(Phase::Error);
        }
    }
}

impl Default for AgentEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentDescriptor;
    use crate::llm::{ChatResponse, MockLlmCaller};
    use crate::store::MemoryStore;
    use crate::tools::ToolManager;
    use crate::trace::Tracer;
    use tokio_util::sync::CancellationToken;

    fn descriptor() -> Arc<AgentDescriptor> {
        Arc::new(AgentDescriptor {
            name: "assistant".to_string(),
            role: "helpful assistant".to_string(),
            system_prompt: "You are helpful.".to_string(),
            tool_allow_list: vec![],
            max_iterations: 3,
            model: "gpt-4".to_string(),
            temperature: 0.0,
            sub_agents: vec![],
            approval_policy: None,
        })
    }

    #[tokio::test]
    async fn single_agent_completion_produces_one_step_and_no_checkpoints() {
        let store = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("task-1", store.clone()));
        let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
        let llm = Arc::new(MockLlmCaller::with_final_answer("Paris"));

        let state = State::new("assistant", Some("capital of France?"));
        let ctx = AgentRunContext::new(descriptor(), llm, tool_manager, Arc::clone(&tracer), state, CancellationToken::new());

        let engine = AgentEngine::new();
        let (answer, final_state) = engine.run(ctx).await.unwrap();

        assert!(answer.contains("Paris"));
        let trace = tracer.snapshot().await;
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(final_state.messages.len(), 2); // seeded user message + assistant answer
    }

    #[tokio::test]
    async fn iteration_limit_on_a_still_tool_calling_response_fails_with_iteration_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("task-2", store));
        let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));

        let looping_response = ChatResponse {
            content: String::new(),
            tool_calls: vec![crate::llm::RequestedToolCall {
                id: "1".to_string(),
                name: "does_not_exist".to_string(),
                args: Default::default(),
            }],
            usage: None,
        };
        let llm = Arc::new(MockLlmCaller::new(vec![
            crate::llm::ScriptedReply::Response(looping_response.clone()),
            crate::llm::ScriptedReply::Response(looping_response.clone()),
            crate::llm::ScriptedReply::Response(looping_response),
        ]));

        let mut desc = (*descriptor()).clone();
        desc.max_iterations = 2;
        let state = State::new("assistant", Some("loop forever"));
        let ctx = AgentRunContext::new(Arc::new(desc), llm, tool_manager, tracer, state, CancellationToken::new());

        let engine = AgentEngine::new();
        let result = engine.run(ctx).await;
        assert!(matches!(result, Err(AgentMeshError::IterationExhausted { .. })));
    }
}
