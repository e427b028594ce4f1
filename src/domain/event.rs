use super::handle::CorrelationId;
use super::session::Phase;
use serde::Serialize;

/// Outward notifications published by the orchestrator.
///
/// `PaymentConfirmed`, `SucceededOnce` and `FailedOnce` fire at most once per
/// session no matter how many poll ticks observed the underlying outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OrchestratorEvent {
    PhaseChanged { phase: Phase },
    PaymentConfirmed { correlation_id: CorrelationId },
    SucceededOnce { correlation_id: CorrelationId },
    FailedOnce { reason: String },
}
