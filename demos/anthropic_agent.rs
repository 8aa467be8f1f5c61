//! # Anthropic Agent Example
//!
//! Demonstrates using `AnthropicCaller` with Claude models, wired to a
//! knowledge-base tool server reached over an SSE transport rather than
//! stdio.
//!
//! # Usage
//! ```bash
//! ANTHROPIC_API_KEY=sk-ant-... cargo run --example anthropic_agent
//! RUST_LOG=info ANTHROPIC_API_KEY=sk-ant-... cargo run --example anthropic_agent
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh::llm::{AnthropicCaller, RetryingLlmCaller, TimeoutLlmCaller};
use agentmesh::tools::{ServerDescriptor, ToolOverride, TransportKind};
use agentmesh::{AgentDescriptor, AgentEngine, AgentRunContext, State, ToolManager, Tracer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentmesh Anthropic Agent Example ===\n");
    println!("Using: AnthropicCaller (Claude via native reqwest HTTP)\n");

    let anthropic = AnthropicCaller::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    let llm = Arc::new(RetryingLlmCaller::new(Arc::new(TimeoutLlmCaller::new(Arc::new(anthropic)))));

    let store = Arc::new(agentmesh::MemoryStore::new());
    let tracer = Arc::new(Tracer::new("anthropic-agent-demo", store));
    let tool_manager = Arc::new(ToolManager::new(Arc::clone(&tracer)));

    tool_manager
        .register(
            ServerDescriptor {
                name: "docs".to_string(),
                kind: TransportKind::EventStream {
                    url: "http://localhost:8090/mcp/sse".to_string(),
                    headers: HashMap::new(),
                },
                enabled: true,
            },
            // knowledge_base lookups can be slow; give this one more room
            // than the manager's default timeout before giving up.
            &[ToolOverride { tool_name: "knowledge_base".to_string(), timeout_secs: Some(60), fallback: vec![] }],
        )
        .await?;

    let descriptor = Arc::new(AgentDescriptor {
        name: "systems-engineer".to_string(),
        role: "expert software engineer specializing in systems programming".to_string(),
        system_prompt: "You are an expert software engineer specializing in systems programming. \
             Use the knowledge_base tool to retrieve accurate technical information \
             before composing your answer. Provide thorough, well-structured responses."
            .to_string(),
        tool_allow_list: vec!["knowledge_base".to_string()],
        max_iterations: 8,
        // Swap for any model your Anthropic plan supports:
        //   "claude-opus-4-6"           — highest quality
        //   "claude-sonnet-4-6"         — balanced
        //   "claude-haiku-4-5-20251001" — fast and cheap
        model: "claude-opus-4-6".to_string(),
        temperature: 0.2,
        sub_agents: vec![],
        approval_policy: None,
    });

    let tool_executor: Arc<dyn agentmesh::ToolExecutor> = tool_manager;
    let state = State::new(
        &descriptor.name,
        Some("What are the key design principles of the Rust programming language, and how does its ownership model prevent memory safety issues?"),
    );
    let ctx = AgentRunContext::new(descriptor, llm, tool_executor, Arc::clone(&tracer), state, CancellationToken::new());

    let engine = AgentEngine::new();
    match engine.run(ctx).await {
        Ok((answer, _final_state)) => {
            println!("\n╔═══════════════════════════════════════╗");
            println!("║           FINAL ANSWER                ║");
            println!("╚═══════════════════════════════════════╝\n");
            println!("{}\n", answer);

            println!("╔═══════════════════════════════════════╗");
            println!("║         EXECUTION TRACE               ║");
            println!("╚═══════════════════════════════════════╝");
            tracer.pretty_print().await;
        }
        Err(e) => {
            eprintln!("Agent failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
