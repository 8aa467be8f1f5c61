use async_trait::async_trait;

use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};

pub struct IdlePhase;

#[async_trait]
impl PhaseHandler for IdlePhase {
    fn phase(&self) -> Phase {
        Phase::Idle
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Idle));
        PhaseEvent::Start
    }
}
