//! The agent's FSM position — named `Phase` to disambiguate from
//! [`crate::state::State`], which is the Message-sequence conversation
//! record. Named `PhaseHandler` for the per-phase behavior contract, after
//! the teacher's unnamed state-handler pattern.

mod acting;
mod done;
mod error;
mod idle;
mod observing;
mod planning;

pub use acting::ActingPhase;
pub use done::DonePhase;
pub use error::ErrorPhase;
pub use idle::IdlePhase;
pub use observing::ObservingPhase;
pub use planning::PlanningPhase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::budget::{TokenBudget, TokenUsage};
use crate::config::AgentDescriptor;
use crate::error::AgentMeshError;
use crate::llm::{LlmCapability, RequestedToolCall};
use crate::output::OutputSender;
use crate::state::{MergeRegistry, State};
use crate::tools::ToolExecutor;
use crate::trace::Tracer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Planning,
    Acting,
    Observing,
    Done,
    Error,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Planning => "Planning",
            Phase::Acting => "Acting",
            Phase::Observing => "Observing",
            Phase::Done => "Done",
            Phase::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a phase handler reports back to the engine, driving the next
/// transition-table lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseEvent {
    Start,
    ToolCallsRequested,
    Completed,
    ActingDone,
    ObservationsContinue,
    IterationExhausted,
    ContextExhausted,
    Failed,
}

pub type TransitionTable = HashMap<(Phase, PhaseEvent), Phase>;

pub fn build_transition_table() -> TransitionTable {
    let mut t = HashMap::new();
    t.insert((Phase::Idle, PhaseEvent::Start), Phase::Planning);
    t.insert((Phase::Planning, PhaseEvent::ToolCallsRequested), Phase::Acting);
    t.insert((Phase::Planning, PhaseEvent::Completed), Phase::Done);
    t.insert((Phase::Planning, PhaseEvent::IterationExhausted), Phase::Error);
    t.insert((Phase::Planning, PhaseEvent::ContextExhausted), Phase::Error);
    t.insert((Phase::Planning, PhaseEvent::Failed), Phase::Error);
    t.insert((Phase::Acting, PhaseEvent::ActingDone), Phase::Observing);
    t.insert((Phase::Acting, PhaseEvent::Failed), Phase::Error);
    t.insert((Phase::Observing, PhaseEvent::ObservationsContinue), Phase::Planning);
    t
}

/// Shared mutable context threaded through every phase handler for one
/// agent run. `state` is the authoritative, persisted conversation; the
/// Planning phase takes its own trimmed working copy for context-limit
/// recovery and never mutates `state` until the call succeeds.
pub struct AgentRunContext {
    pub descriptor: Arc<AgentDescriptor>,
    pub llm: Arc<dyn LlmCapability>,
    pub tool_manager: Arc<dyn ToolExecutor>,
    pub tracer: Arc<Tracer>,
    pub merge_registry: MergeRegistry,
    pub state: State,
    pub allow_list: HashSet<String>,
    pub iteration: usize,
    pub pending_tool_calls: Vec<RequestedToolCall>,
    pub final_answer: Option<String>,
    pub failure: Option<AgentMeshError>,
    pub cancel: CancellationToken,
    pub output_tx: Option<OutputSender>,
    /// Tokens spent so far this run, accumulated from every `ChatResponse`
    /// that reports usage. Capabilities that don't report usage (some
    /// local/mock callers) leave this at zero.
    pub token_usage: TokenUsage,
    /// Caller-supplied ceiling; `None` means unlimited. Checked after each
    /// Planning call once usage is accumulated.
    pub token_budget: Option<TokenBudget>,
}

impl AgentRunContext {
    pub fn new(
        descriptor: Arc<AgentDescriptor>,
        llm: Arc<dyn LlmCapability>,
        tool_manager: Arc<dyn ToolExecutor>,
        tracer: Arc<Tracer>,
        state: State,
        cancel: CancellationToken,
    ) -> Self {
        let allow_list = descriptor.tool_allow_list.iter().cloned().collect();
        Self {
            descriptor,
            llm,
            tool_manager,
            tracer,
            merge_registry: MergeRegistry::default_registry(),
            state,
            allow_list,
            iteration: 0,
            pending_tool_calls: Vec::new(),
            final_answer: None,
            failure: None,
            cancel,
            output_tx: None,
            token_usage: TokenUsage::default(),
            token_budget: None,
        }
    }

    pub fn with_token_budget(mut self, budget: TokenBudget) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn emit(&self, event: crate::output::AgentOutput) {
        if let Some(tx) = &self.output_tx {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
pub trait PhaseHandler: Send + Sync {
    fn phase(&self) -> Phase;

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent;
}

pub fn default_handlers() -> HashMap<Phase, Box<dyn PhaseHandler>> {
    let mut handlers: HashMap<Phase, Box<dyn PhaseHandler>> = HashMap::new();
    handlers.insert(Phase::Idle, Box::new(IdlePhase));
    handlers.insert(Phase::Planning, Box::new(PlanningPhase));
    handlers.insert(Phase::Acting, Box::new(ActingPhase));
    handlers.insert(Phase::Observing, Box::new(ObservingPhase));
    handlers.insert(Phase::Done, Box::new(DonePhase));
    handlers.insert(Phase::Error, Box::new(ErrorPhase));
    handlers
}
