//! Action sink interface.
//!
//! The sink is the boundary to the UI layer: it receives state transitions
//! (to drive an intervention effect) and per-tick scores (to drive a live
//! indicator). Deliveries are fire-and-forget from the core's perspective;
//! a failed transition delivery is retried on the next tick by the
//! pipeline, never awaited.

use crate::core::types::StressScore;
use crate::error::AgentError;
use crate::intervention::InterventionRecord;

/// Receiver for intervention transitions and live scores.
///
/// Implementations must not block: a slow UI must not stall fusion.
pub trait ActionSink: Send {
    fn on_state_transition(&mut self, record: &InterventionRecord) -> Result<(), AgentError>;

    fn on_tick(&mut self, score: &StressScore) -> Result<(), AgentError>;
}

/// Sink that logs transitions and scores through `tracing`.
///
/// The default sink for headless operation; a real UI registers its own.
#[derive(Debug, Default)]
pub struct LogSink;

impl ActionSink for LogSink {
    fn on_state_transition(&mut self, record: &InterventionRecord) -> Result<(), AgentError> {
        tracing::info!(
            from = record.state_from.as_str(),
            to = record.state_to.as_str(),
            score = record.trigger_score,
            reason = %record.trigger_reason,
            "intervention transition"
        );
        Ok(())
    }

    fn on_tick(&mut self, score: &StressScore) -> Result<(), AgentError> {
        tracing::debug!(value = score.value, "stress score");
        Ok(())
    }
}
