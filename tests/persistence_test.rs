//! Durable persistence across a restart: `AgentEngine::with_persistence`
//! writes `state.json` after every phase transition, and workflow
//! checkpoints survive being reloaded through a fresh `FileStore` handle —
//! the same layout a real process restart would see.

use std::sync::Arc;

use agentmesh::checkpoint::CheckpointStore;
use agentmesh::config::{AgentDescriptor, EdgeDefinition, NodeDefinition, WorkflowDefinition};
use agentmesh::llm::MockLlmCaller;
use agentmesh::{
    AgentEngine, AgentRunContext, DurableStoreExt, FileStore, State, StateDelta, ToolExecutor, ToolManager, Tracer, WorkflowEngine,
    WorkflowRunResult,
};
use tokio_util::sync::CancellationToken;

fn descriptor(name: &str, max_iterations: usize) -> Arc<AgentDescriptor> {
    Arc::new(AgentDescriptor {
        name: name.to_string(),
        role: "test agent".to_string(),
        system_prompt: "be helpful".to_string(),
        tool_allow_list: vec![],
        max_iterations,
        model: "gpt-4".to_string(),
        temperature: 0.0,
        sub_agents: vec![],
        approval_policy: None,
    })
}

#[tokio::test]
async fn agent_state_is_persisted_to_disk_after_every_transition() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let tracer = Arc::new(Tracer::new("task-1", Arc::clone(&store) as Arc<dyn agentmesh::DurableStore>));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
    let llm = Arc::new(MockLlmCaller::with_final_answer("a durable answer"));

    let state = State::new("assistant", Some("remember this"));
    let ctx = AgentRunContext::new(descriptor("assistant", 3), llm, tool_manager, tracer, state, CancellationToken::new());

    let engine = AgentEngine::new().with_persistence(Arc::clone(&store) as Arc<dyn agentmesh::DurableStore>, "task-1");
    let (answer, _final_state) = engine.run(ctx).await.unwrap();
    assert_eq!(answer, "a durable answer");

    // Simulate a restart: a brand new FileStore handle over the same
    // directory must see exactly what the run wrote.
    let reopened = FileStore::new(dir.path());
    let persisted: State = reopened.load_json("task-1", "state.json").await.unwrap().unwrap();
    assert_eq!(persisted.messages.len(), 2);
    assert!(persisted.messages.iter().any(|m| m.content.contains("a durable answer")));
}

fn plan_review_workflow() -> WorkflowDefinition {
    let mut nodes = std::collections::HashMap::new();
    nodes.insert("plan".to_string(), NodeDefinition::Agent { agent: "planner".to_string(), interrupt_before: false });
    nodes.insert("review".to_string(), NodeDefinition::Human { interrupt_before: false });

    WorkflowDefinition {
        name: "plan-review".to_string(),
        nodes,
        edges: vec![EdgeDefinition { from: "plan".to_string(), to: Some("review".to_string()), routes: None }],
        entry_node: "plan".to_string(),
        checkpoints: Default::default(),
        max_iterations: 20,
    }
}

#[tokio::test]
async fn a_workflow_checkpoint_survives_being_reloaded_through_a_fresh_store_handle() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path())) as Arc<dyn agentmesh::DurableStore>;
    let tracer = Arc::new(Tracer::new("wf-task", Arc::clone(&store)));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer))) as Arc<dyn ToolExecutor>;
    let mut agents = std::collections::HashMap::new();
    agents.insert("planner".to_string(), descriptor("planner", 3));
    let agents = Arc::new(agents);

    let llm = Arc::new(MockLlmCaller::with_final_answer("drafted plan"));
    let engine = WorkflowEngine::new(
        plan_review_workflow(),
        Arc::clone(&agents),
        llm.clone(),
        Arc::clone(&tool_manager),
        Arc::clone(&tracer),
        CheckpointStore::new(Arc::clone(&store)),
    )
    .unwrap();

    let interrupted = engine.run("wf-task", State::new("planner", Some("ship it"))).await.unwrap();
    let checkpoint = match interrupted {
        WorkflowRunResult::Interrupted(cp) => cp,
        WorkflowRunResult::Completed(_) => panic!("expected the human node to interrupt"),
    };
    assert_eq!(checkpoint.current_node, "review");

    // A fresh store handle (same directory) and a fresh CheckpointStore /
    // WorkflowEngine built from scratch — as a restarted process would do —
    // must still be able to find and resume from the persisted checkpoint.
    let reopened_store = Arc::new(FileStore::new(dir.path())) as Arc<dyn agentmesh::DurableStore>;
    let reopened_checkpoints = CheckpointStore::new(Arc::clone(&reopened_store));
    let reloaded = reopened_checkpoints.latest("wf-task").await.unwrap().unwrap();
    assert_eq!(reloaded.id, checkpoint.id);
    assert_eq!(reloaded.current_node, "review");
    assert!(reloaded.awaiting_human);

    let reopened_engine = WorkflowEngine::new(
        plan_review_workflow(),
        agents,
        llm,
        tool_manager,
        Arc::new(Tracer::new("wf-task", Arc::clone(&reopened_store))),
        reopened_checkpoints,
    )
    .unwrap();

    let resumed = reopened_engine.resume("wf-task", &reloaded, StateDelta::new()).await.unwrap();
    match resumed {
        WorkflowRunResult::Completed(state) => {
            assert!(state.messages.iter().any(|m| m.content.contains("drafted plan")));
        }
        WorkflowRunResult::Interrupted(_) => panic!("review has no outgoing edge, should have completed"),
    }
}
