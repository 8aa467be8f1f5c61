use async_trait::async_trait;

use crate::phase::{AgentRunContext, Phase, PhaseEvent, PhaseHandler};

/// Closes out an iteration after tool results have been folded into state.
/// The iteration's single step record was already logged in the Planning
/// phase (before Acting dispatched, so tool-call attempts attach to it) —
/// this phase has nothing left to record, only to loop back.
pub struct ObservingPhase;

#[async_trait]
impl PhaseHandler for ObservingPhase {
    fn phase(&self) -> Phase {
        Phase::Observing
    }

    async fn handle(&self, ctx: &mut AgentRunContext) -> PhaseEvent {
        ctx.emit(crate::output::AgentOutput::PhaseStarted(Phase::Observing));
        PhaseEvent::ObservationsContinue
    }
}
