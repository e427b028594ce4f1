use super::orchestrator::PaymentOrchestrator;
use super::polling::Stage;
use crate::domain::handle::{CorrelationId, LocalDurableHandle};
use crate::domain::session::{OrchestrationSession, Phase};
use crate::domain::status::StatusValue;
use crate::error::Result;
use tracing::{info, warn};

/// What `resume` decided after inspecting the local durable handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No handle was persisted.
    NoHandle,
    /// A live session already owns the slot; nothing was touched.
    AlreadyActive,
    /// The handle was stale or pointed at a flow that can no longer progress,
    /// and was deleted.
    Discarded,
    /// The status read failed; the handle is kept for a later attempt.
    Deferred,
    /// Poll Loop A was re-attached.
    ResumedPayment(CorrelationId),
    /// Poll Loop B was re-attached with the side-effect guard closed.
    ResumedGeneration(CorrelationId),
    /// The flow had already finished; the handle was deleted.
    Resolved,
    /// The flow failed and waits for `cancel` or a fresh `start`. The handle
    /// is kept and no loop starts.
    Failed(CorrelationId),
}

impl PaymentOrchestrator {
    /// Re-attaches polling to a flow interrupted by a restart or by the host
    /// losing foreground.
    ///
    /// The status register is read exactly once. A resumed session never
    /// fires the side effect for a payment that was already acknowledged; it
    /// only waits for the artifacts.
    pub async fn resume(&self) -> Result<ResumeOutcome> {
        let _control = self.inner.control.lock().await;
        let ports = &self.inner.ports;

        let Some(handle) = ports.handles.load().await? else {
            return Ok(ResumeOutcome::NoHandle);
        };

        {
            let slot = self.inner.slot.lock().await;
            if let Some(session) = &slot.session {
                if !session.phase.is_terminal() {
                    return Ok(ResumeOutcome::AlreadyActive);
                }
                if session.phase == Phase::Failed
                    && session.correlation_id == handle.correlation_id
                {
                    return Ok(ResumeOutcome::Failed(handle.correlation_id));
                }
            }
        }

        if handle.is_stale(ports.clock.now(), self.inner.config.staleness_ttl()) {
            info!(
                correlation_id = %handle.correlation_id,
                created_at = %handle.created_at,
                "discarding stale payment handle"
            );
            self.inner.clear_handle(&handle.correlation_id).await;
            return Ok(ResumeOutcome::Discarded);
        }

        if handle.failed {
            info!(correlation_id = %handle.correlation_id, "payment flow failed earlier, not resuming");
            return Ok(ResumeOutcome::Failed(handle.correlation_id));
        }

        let status = match ports.status.read(&handle.subject_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(correlation_id = %handle.correlation_id, error = %e, "status read failed, resume deferred");
                return Ok(ResumeOutcome::Deferred);
            }
        };

        match status {
            StatusValue::AwaitingPayment => {
                self.reattach(&handle, Phase::AwaitingPayment, Stage::Payment)
                    .await;
                Ok(ResumeOutcome::ResumedPayment(handle.correlation_id))
            }
            StatusValue::PaymentAcknowledged => {
                let complete = match ports.artifacts.is_complete(&handle.subject_id).await {
                    Ok(complete) => complete,
                    Err(e) => {
                        warn!(correlation_id = %handle.correlation_id, error = %e, "artifact read failed, resume deferred");
                        return Ok(ResumeOutcome::Deferred);
                    }
                };
                if complete {
                    self.inner.clear_handle(&handle.correlation_id).await;
                    return Ok(ResumeOutcome::Resolved);
                }
                self.reattach(&handle, Phase::AwaitingGeneration, Stage::Generation)
                    .await;
                Ok(ResumeOutcome::ResumedGeneration(handle.correlation_id))
            }
            StatusValue::EntitlementActive => {
                self.inner.clear_handle(&handle.correlation_id).await;
                Ok(ResumeOutcome::Resolved)
            }
            other => {
                info!(correlation_id = %handle.correlation_id, status = %other, "handle no longer resumable");
                self.inner.clear_handle(&handle.correlation_id).await;
                Ok(ResumeOutcome::Discarded)
            }
        }
    }

    async fn reattach(&self, handle: &LocalDurableHandle, phase: Phase, stage: Stage) {
        let mut slot = self.inner.slot.lock().await;
        let epoch = slot.halt();
        let mut session = OrchestrationSession::resumed(handle, stage == Stage::Generation);
        self.inner.enter(&mut session, phase);
        slot.session = Some(session);
        self.inner.spawn_driver(&mut slot, epoch, stage);
        info!(correlation_id = %handle.correlation_id, %phase, "payment session resumed");
    }
}
