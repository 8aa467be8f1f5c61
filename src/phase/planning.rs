use async_trait::async_trait;

use crate::error::{AgentMeshError, ErrorContext};
use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};
use crate::state::{Message, Role, StateDelta, ToolCallRequest};
use crate::trace::Severity;

pub struct PlanningPhase;

/// `messages` is at its trim floor once only the leading system messages
/// (if any) and a single trailing message remain — that trailing message is
/// the "latest user" message the spec requires survive trimming.
fn trim_floor_reached(messages: &[Message]) -> bool {
    let system_count = messages.iter().filter(|m| matches!(m.role, Role::System)).count();
    messages.len() <= system_count + 1
}

fn trim_oldest_non_system(messages: &mut Vec<Message>) -> bool {
    if let Some(idx) = messages.iter().position(|m| !matches!(m.role, Role::System)) {
        messages.remove(idx);
        true
    } else {
        false
    }
}

#[async_trait]
impl PhaseHandler for PlanningPhase {
    fn phase(&self) -> Phase {
        Phase::Planning
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Planning));

        if ctx.iteration >= ctx.descriptor.max_iterations {
            ctx.failure = Some(AgentMeshError::IterationExhausted {
                attempt: ctx.iteration,
                ctx: ErrorContext::new().with_task(ctx.state.current_agent.as_str()).with_attempt(ctx.iteration as u32),
            });
            return PhaseEvent::IterationExhausted;
        }
        ctx.iteration += 1;

        let started = std::time::Instant::now();
        let tools = ctx.tool_manager.schemas_for(&ctx.allow_list).await;
        let mut working = ctx.state.messages.clone();

        let response = loop {
            match ctx
                .llm
                .chat(&working, &ctx.descriptor.system_prompt, &tools, &ctx.descriptor.model)
                .await
            {
                Ok(resp) => break Ok(resp),
                Err(AgentMeshError::ContextLimit) => {
                    if trim_floor_reached(&working) || !trim_oldest_non_system(&mut working) {
                        break Err(AgentMeshError::ContextExhausted {
                            ctx: ErrorContext::new().with_task(ctx.state.current_agent.as_str()),
                        });
                    }
                }
                Err(e) => break Err(e),
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        let response = match response {
            Ok(r) => r,
            Err(AgentMeshError::ContextExhausted { ctx: ectx }) => {
                ctx.failure = Some(AgentMeshError::ContextExhausted { ctx: ectx });
                let _ = ctx
                    .tracer
                    .log_step("planning", "context window exhausted after trimming", &ctx.state.current_agent, Severity::Error, vec![], duration_ms)
                    .await;
                return PhaseEvent::ContextExhausted;
            }
            Err(e) => {
                ctx.emit(crate::output::AgentOutput::Error(e.to_string()));
                let _ = ctx
                    .tracer
                    .log_step("planning", &e.to_string(), &ctx.state.current_agent, Severity::Error, vec![], duration_ms)
                    .await;
                ctx.failure = Some(e);
                return PhaseEvent::Failed;
            }
        };

        if let Some(usage) = response.usage {
            ctx.token_usage.add(usage);
        }
        if let Some(budget) = &ctx.token_budget {
            if budget.is_exceeded(ctx.token_usage) {
                ctx.failure = Some(AgentMeshError::TokenBudgetExceeded {
                    ctx: ErrorContext::new().with_task(ctx.state.current_agent.as_str()),
                });
                let _ = ctx
                    .tracer
                    .log_step("planning", "token budget exceeded", &ctx.state.current_agent, Severity::Error, vec![], duration_ms)
                    .await;
                return PhaseEvent::Failed;
            }
        }

        let is_final = response.is_final();
        let assistant_message = if is_final {
            Message::assistant(response.content.clone())
        } else {
            Message::assistant_with_tool_calls(
                response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolCallRequest {
                        id: tc.id.clone(),
                        server: String::new(),
                        tool: tc.name.clone(),
                        args: tc.args.clone(),
                    })
                    .collect(),
            )
        };

        ctx.state = ctx.state.apply(StateDelta::new().with_messages(vec![assistant_message]), &ctx.merge_registry);

        // Logged before Acting dispatches tool calls, so the tool manager's
        // per-attempt records attach to this iteration's step, not the
        // previous one.
        let step_message = if is_final {
            response.content.clone()
        } else {
            format!("requested {} tool call(s)", response.tool_calls.len())
        };
        let _ = ctx
            .tracer
            .log_step("planning", &step_message, &ctx.state.current_agent, Severity::Info, vec![], duration_ms)
            .await;

        if is_final {
            ctx.final_answer = Some(response.content);
            ctx.emit(crate::output::AgentOutput::FinalAnswer(
                ctx.final_answer.clone().unwrap_or_default(),
            ));
            PhaseEvent::Completed
        } else {
            ctx.pending_tool_calls = response.tool_calls;
            PhaseEvent::ToolCallsRequested
        }
    }
}
