//! A multi-agent orchestration core: single-agent reasoning loops, sub-agent
//! delegation, durable checkpointed workflows, dependency-driven task
//! batches, and a bounded-concurrency orchestrator tying them together.

pub mod budget;
pub mod checkpoint;
pub mod config;
pub mod dag;
pub mod engine;
pub mod error;
pub mod human;
pub mod ids;
pub mod llm;
pub mod mcp;
pub mod orchestrator;
pub mod output;
pub mod phase;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod task;
pub mod tools;
pub mod trace;
pub mod workflow;

pub use budget::{TokenBudget, TokenUsage};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{AgentDescriptor, EdgeDefinition, NodeDefinition, RetryPolicy, WorkflowDefinition};
pub use dag::{DependencyAnalyzer, DependencyGraph, ExtractedArtifacts};
pub use engine::AgentEngine;
pub use error::{AgentMeshError, ErrorContext};
pub use human::{ApprovalPolicy, HumanApprovalRequest, HumanDecision, RiskLevel};
pub use llm::{ChatResponse, LlmCapability, RequestedToolCall};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use output::{AgentOutput, OutputSender};
pub use phase::{AgentRunContext, Phase, PhaseEvent};
pub use state::{Message, MergeRegistry, Role, State, StateDelta};
pub use store::{DurableStore, DurableStoreExt, FileStore, MemoryStore};
pub use supervisor::SubAgentSupervisor;
pub use task::{RunnerKind, Task, TaskErrorRecord, TaskStatus};
pub use tools::{ServerDescriptor, ToolDescriptor, ToolExecutor, ToolManager, ToolOverride, TransportKind};
pub use trace::{Severity, Trace, Tracer};
pub use workflow::{WorkflowEngine, WorkflowRunResult};
