use async_trait::async_trait;

use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};

pub struct ErrorPhase;

#[async_trait]
impl PhaseHandler for ErrorPhase {
    fn phase(&self) -> Phase {
        Phase::Error
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Error));
        PhaseEvent::Failed
    }
}
