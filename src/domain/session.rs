use super::handle::{CorrelationId, IdempotencyKey, LocalDurableHandle};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    AwaitingPayment,
    FiringSideEffect,
    AwaitingGeneration,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Succeeded | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingPayment => "awaiting-payment",
            Phase::FiringSideEffect => "firing-side-effect",
            Phase::AwaitingGeneration => "awaiting-generation",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// In-memory state of one payment attempt, owned by a single orchestrator.
///
/// The `claim_*` methods are check-and-set guards: each returns `true` exactly
/// once for the lifetime of the session. Callers must hold the orchestrator's
/// state lock while claiming so two ticks can never both win.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationSession {
    pub correlation_id: CorrelationId,
    pub owner_id: String,
    pub subject_id: String,
    pub phase: Phase,
    side_effect_fired: bool,
    notified_success: bool,
    notified_completion: bool,
    notified_failure: bool,
}

impl OrchestrationSession {
    pub fn new(
        correlation_id: CorrelationId,
        owner_id: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            owner_id: owner_id.into(),
            subject_id: subject_id.into(),
            phase: Phase::Idle,
            side_effect_fired: false,
            notified_success: false,
            notified_completion: false,
            notified_failure: false,
        }
    }

    /// Rebuilds a session from a persisted handle during recovery.
    ///
    /// When `side_effect_fired` is set the guard starts closed, so the
    /// resumed session can never fire the side effect itself.
    pub fn resumed(handle: &LocalDurableHandle, side_effect_fired: bool) -> Self {
        let mut session = Self::new(
            handle.correlation_id.clone(),
            handle.owner_id.clone(),
            handle.subject_id.clone(),
        );
        session.side_effect_fired = side_effect_fired;
        session
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::entitlement(&self.correlation_id)
    }

    pub fn side_effect_fired(&self) -> bool {
        self.side_effect_fired
    }

    pub fn claim_side_effect(&mut self) -> bool {
        !std::mem::replace(&mut self.side_effect_fired, true)
    }

    pub fn claim_success_notice(&mut self) -> bool {
        !std::mem::replace(&mut self.notified_success, true)
    }

    pub fn claim_completion_notice(&mut self) -> bool {
        !std::mem::replace(&mut self.notified_completion, true)
    }

    pub fn claim_failure_notice(&mut self) -> bool {
        !std::mem::replace(&mut self.notified_failure, true)
    }
}
