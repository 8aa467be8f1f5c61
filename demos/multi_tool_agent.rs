//! # Multi-Tool Agent Example
//!
//! Demonstrates an agent wired to multiple MCP tool servers (a calculator
//! and a weather lookup), a per-agent tool allow-list that keeps a third
//! registered tool ("search") out of reach, and a cheaper model than the
//! default for this particular agent.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example multi_tool_agent
//! ```
//!
//! Expects `calculator-server`, `weather-server`, and `search-server`
//! executables on PATH speaking MCP over stdio; swap the commands below for
//! whatever tool servers you have available.

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh::llm::{OpenAiCaller, RetryingLlmCaller, TimeoutLlmCaller};
use agentmesh::tools::{ServerDescriptor, TransportKind};
use agentmesh::{AgentDescriptor, AgentEngine, AgentRunContext, State, ToolManager, Tracer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentmesh Multi-Tool Agent Example ===\n");
    println!("Task: Calculate 137 * 48 and then find today's weather in London.\n");

    let store = Arc::new(agentmesh::MemoryStore::new());
    let tracer = Arc::new(Tracer::new("multi-tool-demo", store));
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
    tool_manager
        .register(
            ServerDescriptor {
                name: "weather".to_string(),
                kind: TransportKind::Stdio { command: "weather-server".to_string(), args: vec![], env: HashMap::new() },
                enabled: true,
            },
            &[],
        )
        .await?;
    // Registered so it shows up in discovery, but deliberately left off this
    // agent's tool_allow_list below — the agent can never reach it.
    tool_manager
        .register(
            ServerDescriptor {
                name: "search".to_string(),
                kind: TransportKind::Stdio { command: "search-server".to_string(), args: vec![], env: HashMap::new() },
                enabled: true,
            },
            &[],
        )
        .await?;

    let descriptor = Arc::new(AgentDescriptor {
        name: "calculator-assistant".to_string(),
        role: "precise assistant with calculator and weather tools".to_string(),
        system_prompt: "You are a precise assistant with access to a calculator and weather tools. \
             Always use the calculator for arithmetic. Never guess weather — always use the tool."
            .to_string(),
        tool_allow_list: vec!["calculator".to_string(), "current_weather".to_string()],
        max_iterations: 8,
        // A cheaper/faster model than the default, since this agent only does
        // arithmetic and tool lookups rather than open-ended reasoning.
        model: "gpt-4o-mini".to_string(),
        temperature: 0.0,
        sub_agents: vec![],
        approval_policy: None,
    });

    let llm = Arc::new(RetryingLlmCaller::new(Arc::new(TimeoutLlmCaller::new(Arc::new(OpenAiCaller::new())))));
    let tool_executor: Arc<dyn agentmesh::ToolExecutor> = tool_manager;
    let state = State::new(
        &descriptor.name,
        Some("Please calculate 137 multiplied by 48, and also tell me the current weather conditions in London, UK."),
    );
    let ctx = AgentRunContext::new(descriptor, llm, tool_executor, Arc::clone(&tracer), state, CancellationToken::new());

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
            let trace = tracer.snapshot().await;
            trace.pretty_print();
            println!("\nAgent completed in {} trace steps.", trace.steps.len());
        }
        Err(e) => {
            eprintln!("Agent failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
