use async_trait::async_trait;

use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};
use crate::state::{Message, StateDelta};

pub struct ActingPhase;

#[async_trait]
impl PhaseHandler for ActingPhase {
    fn phase(&self) -> Phase {
        Phase::Acting
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Acting));

        // Sequential, in the order the LLM listed them — observable state
        // sequencing depends on it, so these never run concurrently.
        let pending = std::mem::take(&mut ctx.pending_tool_calls);
        for call in pending {
            if ctx.cancel.is_cancelled() {
                ctx.failure = Some(crate::error::AgentMeshError::Cancelled {
                    ctx: crate::error::ErrorContext::new().with_task(ctx.state.current_agent.as_str()),
                });
                return PhaseEvent::Failed;
            }

            ctx.emit(crate::output::AgentOutput::ToolCallStarted { name: call.name.clone(), args: call.args.clone() });

            let outcome = ctx.tool_manager.execute(&ctx.allow_list, &call.name, call.args.clone(), None).await;

            let (text, success) = match outcome {
                Ok(text) => (text, true),
                Err(e) if e.is_cancelled() => {
                    ctx.failure = Some(e);
                    return PhaseEvent::Failed;
                }
                Err(crate::error::AgentMeshError::StoreIo { message }) => {
                    ctx.failure = Some(crate::error::AgentMeshError::StoreIo { message });
                    return PhaseEvent::Failed;
                }
                Err(crate::error::AgentMeshError::Corruption { message }) => {
                    ctx.failure = Some(crate::error::AgentMeshError::Corruption { message });
                    return PhaseEvent::Failed;
                }
                Err(e) => (format!("ERROR: {e}"), false),
            };

            ctx.emit(crate::output::AgentOutput::ToolCallFinished { name: call.name.clone(), result: text.clone(), success });

            let tool_message = Message::tool_result(call.id.clone(), text);
            ctx.state = ctx.state.apply(StateDelta::new().with_messages(vec![tool_message]), &ctx.merge_registry);
        }

        PhaseEvent::ActingDone
    }
}
