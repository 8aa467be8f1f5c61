//! Token usage accounting and budget enforcement, driven directly against
//! `PlanningPhase` (accumulation) and the full `AgentEngine` loop (enforcement).

use std::sync::Arc;

use agentmesh::budget::{TokenBudget, TokenUsage};
use agentmesh::llm::{ChatResponse, MockLlmCaller, RequestedToolCall, ScriptedReply};
use agentmesh::phase::{AgentRunContext, PhaseEvent, PhaseHandler, PlanningPhase};
use agentmesh::{AgentDescriptor, AgentEngine, AgentMeshError, MemoryStore, State, ToolManager, Tracer};
use tokio_util::sync::CancellationToken;

fn descriptor(max_iterations: usize) -> Arc<AgentDescriptor> {
    Arc::new(AgentDescriptor {
        name: "assistant".to_string(),
        role: "helpful assistant".to_string(),
        system_prompt: "You are helpful.".to_string(),
        tool_allow_list: vec!["dummy".to_string()],
        max_iterations,
        model: "gpt-4".to_string(),
        temperature: 0.0,
        sub_agents: vec![],
        approval_policy: None,
    })
}

fn tool_call_response(usage: TokenUsage) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![RequestedToolCall { id: "call_1".to_string(), name: "dummy".to_string(), args: Default::default() }],
        usage: Some(usage),
    }
}

#[tokio::test]
async fn planning_accumulates_usage_across_successive_calls() {
    let store = Arc::new(MemoryStore::new());
    let tracer = Arc::new(Tracer::new("task-1", store));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
    let llm = Arc::new(MockLlmCaller::new(vec![
        ScriptedReply::Response(tool_call_response(TokenUsage::new(10, 20))),
        ScriptedReply::Response(tool_call_response(TokenUsage::new(5, 15))),
    ]));

    let state = State::new("assistant", Some("do something"));
    let mut ctx = AgentRunContext::new(descriptor(5), llm, tool_manager, tracer, state, CancellationToken::new());

    let planning = PlanningPhase;
    let first = planning.handle(&mut ctx).await;
    assert_eq!(first, PhaseEvent::ToolCallsRequested);
    assert_eq!(ctx.token_usage.total_tokens, 30);

    let second = planning.handle(&mut ctx).await;
    assert_eq!(second, PhaseEvent::ToolCallsRequested);
    assert_eq!(ctx.token_usage.input_tokens, 15);
    assert_eq!(ctx.token_usage.output_tokens, 35);
    assert_eq!(ctx.token_usage.total_tokens, 50);
}

#[tokio::test]
async fn exceeding_the_budget_fails_the_run_before_tool_dispatch() {
    let store = Arc::new(MemoryStore::new());
    let tracer = Arc::new(Tracer::new("task-2", store));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
    let llm = Arc::new(MockLlmCaller::new(vec![ScriptedReply::Response(tool_call_response(TokenUsage::new(40, 20)))]));

    let state = State::new("assistant", Some("do something expensive"));
    let ctx = AgentRunContext::new(descriptor(5), llm, tool_manager, tracer, state, CancellationToken::new())
        .with_token_budget(TokenBudget::new(50));

    let engine = AgentEngine::new();
    let result = engine.run(ctx).await;

    assert!(matches!(result, Err(AgentMeshError::TokenBudgetExceeded { .. })), "expected TokenBudgetExceeded, got {result:?}");
}

#[tokio::test]
async fn usage_within_budget_lets_the_run_complete() {
    let store = Arc::new(MemoryStore::new());
    let tracer = Arc::new(Tracer::new("task-3", store));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
    let llm = Arc::new(MockLlmCaller::new(vec![ScriptedReply::Response(ChatResponse {
        content: "well within budget".to_string(),
        tool_calls: vec![],
        usage: Some(TokenUsage::new(5, 5)),
    })]));

    let state = State::new("assistant", Some("cheap question"));
    let ctx = AgentRunContext::new(descriptor(5), llm, tool_manager, tracer, state, CancellationToken::new())
        .with_token_budget(TokenBudget::new(50));

    let engine = AgentEngine::new();
    let (answer, _state) = engine.run(ctx).await.unwrap();
    assert_eq!(answer, "well within budget");
}
