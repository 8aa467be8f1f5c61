use async_trait::async_trait;

use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};

pub struct DonePhase;

#[async_trait]
impl PhaseHandler for DonePhase {
    fn phase(&self) -> Phase {
        Phase::Done
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Done));
        PhaseEvent::Completed
    }
}
