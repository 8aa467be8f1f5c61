//! Multiple tool calls requested in a single Planning turn are dispatched
//! strictly in order, never concurrently — `ActingPhase` iterates its pending
//! calls with a plain `for` loop rather than fanning out with `join_all`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentmesh::llm::{ChatResponse, MockLlmCaller, RequestedToolCall, ScriptedReply};
use agentmesh::{AgentDescriptor, AgentEngine, AgentMeshError, AgentRunContext, MemoryStore, State, ToolDescriptor, ToolExecutor, Tracer};
use tokio_util::sync::CancellationToken;

/// Records a `start:<tool>` / `end:<tool>` pair around a fixed sleep, so the
/// test can tell interleaved dispatch apart from strictly sequential dispatch.
struct RecordingExecutor {
    log: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(
        &self,
        _allow_list: &HashSet<String>,
        tool_name: &str,
        _args: HashMap<String, Value>,
        _timeout_override: Option<Duration>,
    ) -> Result<String, AgentMeshError> {
        self.log.lock().unwrap().push(format!("start:{tool_name}"));
        tokio::time::sleep(self.delay).await;
        self.log.lock().unwrap().push(format!("end:{tool_name}"));
        Ok(format!("{tool_name} done"))
    }

    async fn schemas_for(&self, _allow_list: &HashSet<String>) -> Vec<ToolDescriptor> {
        vec![]
    }
}

#[tokio::test]
async fn two_tool_calls_in_one_turn_run_sequentially_not_concurrently() {
    let store = Arc::new(MemoryStore::new());
    let tracer = Arc::new(Tracer::new("task-1", store));

    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Arc::new(RecordingExecutor { log: Arc::clone(&log), delay: Duration::from_millis(60) });

    let llm = Arc::new(MockLlmCaller::new(vec![
        ScriptedReply::Response(ChatResponse {
            content: String::new(),
            tool_calls: vec![
                RequestedToolCall { id: "id_a".to_string(), name: "tool_a".to_string(), args: Default::default() },
                RequestedToolCall { id: "id_b".to_string(), name: "tool_b".to_string(), args: Default::default() },
            ],
            usage: None,
        }),
        ScriptedReply::Response(ChatResponse { content: "Both tools finished.".to_string(), tool_calls: vec![], usage: None }),
    ]));

    let descriptor = Arc::new(AgentDescriptor {
        name: "assistant".to_string(),
        role: "runs two tools".to_string(),
        system_prompt: "be helpful".to_string(),
        tool_allow_list: vec!["tool_a".to_string(), "tool_b".to_string()],
        max_iterations: 4,
        model: "gpt-4".to_string(),
        temperature: 0.0,
        sub_agents: vec![],
        approval_policy: None,
    });

    let state = State::new("assistant", Some("run two tools"));
    let ctx = AgentRunContext::new(descriptor, llm, executor, tracer, state, CancellationToken::new());

    let started = std::time::Instant::now();
    let (answer, final_state) = AgentEngine::new().run(ctx).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(answer, "Both tools finished.");
    assert!(elapsed >= Duration::from_millis(110), "sequential dispatch should take ~120ms, took {elapsed:?}");

    let recorded = log.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec!["start:tool_a".to_string(), "end:tool_a".to_string(), "start:tool_b".to_string(), "end:tool_b".to_string()],
        "tool_b must not start before tool_a finishes"
    );

    // Both tool results land as separate Tool messages in arrival order.
    let tool_messages: Vec<_> = final_state.messages.iter().filter(|m| matches!(m.role, agentmesh::Role::Tool)).collect();
    assert_eq!(tool_messages.len(), 2);
    assert!(tool_messages[0].content.contains("tool_a"));
    assert!(tool_messages[1].content.contains("tool_b"));
}
