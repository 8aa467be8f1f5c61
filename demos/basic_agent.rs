//! # Basic Agent Example
//!
//! Demonstrates the minimal working agent using OpenAI and no tools.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example basic_agent
//! RUST_LOG=debug OPENAI_API_KEY=sk-... cargo run --example basic_agent
//! ```

use std::sync::Arc;

use agentmesh::llm::{OpenAiCaller, RetryingLlmCaller, TimeoutLlmCaller};
use agentmesh::{AgentDescriptor, AgentEngine, AgentRunContext, State, ToolManager, Tracer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentmesh Basic Agent Example ===\n");

    let descriptor = Arc::new(AgentDescriptor {
        name: "researcher".to_string(),
        role: "helpful research assistant".to_string(),
        system_prompt: "You are a helpful research assistant.".to_string(),
        tool_allow_list: vec![],
        max_iterations: 10,
        // Change this to any model your LLM caller supports:
        //   OpenAI:    "gpt-4o", "gpt-4o-mini", "o1"
        //   Anthropic: "claude-opus-4-6", "claude-sonnet-4-6"
        //   Groq:      "llama-3.3-70b-versatile"
        model: "gpt-4o".to_string(),
        temperature: 0.0,
        sub_agents: vec![],
        approval_policy: None,
    });

    let llm = Arc::new(RetryingLlmCaller::new(Arc::new(TimeoutLlmCaller::new(Arc::new(OpenAiCaller::new())))));
    let store = Arc::new(agentmesh::MemoryStore::new());
    let tracer = Arc::new(Tracer::new("basic-agent-demo", store));
    let tool_manager: Arc<dyn agentmesh::ToolExecutor> = Arc::new(ToolManager::new(Arc::clone(&tracer)));

    let state = State::new(&descriptor.name, Some("What is the capital of France and what is its population?"));
    let ctx = AgentRunContext::new(descriptor, llm, tool_manager, Arc::clone(&tracer), state, CancellationToken::new());

    let engine = AgentEngine::new();
    match engine.run(ctx).await {
        Ok((answer, _final_state)) => {
            println!("\n╔══════════════════════╗");
            println!("║    FINAL ANSWER      ║");
            println!("╚══════════════════════╝");
            println!("{}\n", answer);

            println!("╔══════════════════════╗");
            println!("║       TRACE          ║");
            println!("╚══════════════════════╝");
            tracer.pretty_print().await;
        }
        Err(e) => {
            eprintln!("Agent failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
