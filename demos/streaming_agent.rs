//! # Streaming Agent Example
//!
//! Demonstrates draining the agent's live `AgentOutput` side-channel while
//! the reasoning loop runs concurrently in a background task.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example streaming_agent
//! ```

use std::collections::HashMap;
use std::io::{stdout, Write};
use std::sync::Arc;

use agentmesh::llm::{OpenAiCaller, RetryingLlmCaller, TimeoutLlmCaller};
use agentmesh::tools::{ServerDescriptor, TransportKind};
use agentmesh::{AgentDescriptor, AgentEngine, AgentOutput, AgentRunContext, State, ToolManager, Tracer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Starting agentmesh Streaming Example...");

    let store = Arc::new(agentmesh::MemoryStore::new());
    let tracer = Arc::new(Tracer::new("streaming-demo", store));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));
    tool_manager
        .register(
            ServerDescriptor {
                name: "calc".to_string(),
                kind: TransportKind::Stdio { command: "calculator-server".to_string(), args: vec![], env: HashMap::new() },
                enabled: true,
            },
            &[],
        )
        .await?;

    let descriptor = Arc::new(AgentDescriptor {
        name: "narrator".to_string(),
        role: "explains systems programming concepts".to_string(),
        system_prompt: "Explain concepts clearly and use tools when arithmetic is involved.".to_string(),
        tool_allow_list: vec!["calculator".to_string()],
        max_iterations: 8,
        model: "gpt-4o".to_string(),
        temperature: 0.3,
        sub_agents: vec![],
        approval_policy: None,
    });

    let llm = Arc::new(RetryingLlmCaller::new(Arc::new(TimeoutLlmCaller::new(Arc::new(OpenAiCaller::new())))));
    let tool_executor: Arc<dyn agentmesh::ToolExecutor> = tool_manager;
    let state = State::new(
        &descriptor.name,
        Some("Explain the importance of Rust in system programming and then use the calculator tool to add 123 and 456."),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut ctx = AgentRunContext::new(descriptor, llm, tool_executor, Arc::clone(&tracer), state, CancellationToken::new());
    ctx.output_tx = Some(tx);

    let run_handle = tokio::spawn(async move { AgentEngine::new().run(ctx).await });

    println!("\n--- Streaming Output ---\n");
    while let Some(event) = rx.recv().await {
        match event {
            AgentOutput::PhaseStarted(phase) => {
                println!("\n\n[PHASE] Entering: {}", phase);
            }
            AgentOutput::LlmToken(token) => {
                print!("{}", token);
                stdout().flush()?;
            }
            AgentOutput::ToolCallStarted { name, args } => {
                println!("\n[TOOL CALL] {} with arguments: {:?}", name, args);
            }
            AgentOutput::ToolCallFinished { name, result, success } => {
                println!("[TOOL RESULT] {} (success: {}): {}", name, success, result);
            }
            AgentOutput::FinalAnswer(answer) => {
                println!("\n\n[FINAL ANSWER]\n{}", answer);
            }
            AgentOutput::Error(err) => {
                eprintln!("\n[ERROR] {}", err);
            }
        }
    }

    match run_handle.await? {
        Ok((answer, _state)) => println!("\nAgent finished: {}", answer),
        Err(e) => eprintln!("Agent failed: {}", e),
    }

    println!("\n--- Streaming Complete ---\n");
    Ok(())
}
