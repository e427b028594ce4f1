use super::polling::Stage;
use crate::config::OrchestratorConfig;
use crate::domain::event::OrchestratorEvent;
use crate::domain::handle::{CorrelationId, LocalDurableHandle};
use crate::domain::ports::Collaborators;
use crate::domain::session::{OrchestrationSession, Phase};
use crate::domain::status::StatusValue;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Reconciles a payment provider, the subject's status register and the
/// generation pipeline into a single observable state machine.
///
/// `start` and `cancel` return as soon as their bookkeeping is done; all
/// further progress happens on a background driver task and is published
/// through [`PaymentOrchestrator::subscribe`]. Cloning yields another handle
/// to the same orchestrator.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) ports: Collaborators,
    pub(crate) config: OrchestratorConfig,
    pub(crate) slot: Mutex<Slot>,
    /// Serializes `start`, `cancel` and `resume` against each other.
    pub(crate) control: Mutex<()>,
    events: broadcast::Sender<OrchestratorEvent>,
}

/// The single session slot plus the driver task that currently owns it.
#[derive(Default)]
pub(crate) struct Slot {
    pub(crate) session: Option<OrchestrationSession>,
    epoch: u64,
    driver: Option<JoinHandle<()>>,
}

impl Slot {
    /// Stops the active driver and invalidates every tick already in flight.
    ///
    /// Returns the new epoch; only a driver spawned with it may mutate the
    /// session from now on.
    pub(crate) fn halt(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.epoch
    }

    pub(crate) fn live(&mut self, epoch: u64) -> Option<&mut OrchestrationSession> {
        if self.epoch == epoch {
            self.session.as_mut()
        } else {
            None
        }
    }

    pub(crate) fn attach(&mut self, driver: JoinHandle<()>) {
        self.driver = Some(driver);
    }
}

impl PaymentOrchestrator {
    pub fn new(ports: Collaborators, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                ports,
                config,
                slot: Mutex::new(Slot::default()),
                control: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub async fn phase(&self) -> Phase {
        let slot = self.inner.slot.lock().await;
        slot.session
            .as_ref()
            .map(|session| session.phase)
            .unwrap_or(Phase::Idle)
    }

    /// Snapshot of the current session, if any.
    pub async fn session(&self) -> Option<OrchestrationSession> {
        self.inner.slot.lock().await.session.clone()
    }

    /// Begins a new payment attempt for `subject_id`.
    ///
    /// Any session still in flight is stopped and replaced; when it belonged
    /// to another subject, that subject's register is reset as `cancel`
    /// would. Failures of the setup calls are returned directly and leave the
    /// orchestrator idle.
    pub async fn start(&self, owner_id: &str, subject_id: &str) -> Result<CorrelationId> {
        let _control = self.inner.control.lock().await;
        let ports = &self.inner.ports;

        let superseded = {
            let mut slot = self.inner.slot.lock().await;
            slot.halt();
            slot.session
                .take()
                .filter(|previous| !previous.phase.is_terminal())
        };
        if let Some(previous) = superseded {
            warn!(
                correlation_id = %previous.correlation_id,
                phase = %previous.phase,
                "superseding in-flight payment session"
            );
            // The new attempt rewrites its own subject's register below.
            if previous.subject_id != subject_id
                && let Err(e) = self.inner.compensate(&previous.subject_id).await
            {
                warn!(subject_id = %previous.subject_id, error = %e, "could not reset status of superseded session");
            }
            self.inner.emit(OrchestratorEvent::PhaseChanged { phase: Phase::Idle });
        }

        let correlation_id = ports.correlations.register(owner_id, subject_id).await?;
        let handle = LocalDurableHandle::new(
            owner_id,
            subject_id,
            correlation_id.clone(),
            ports.clock.now(),
        );
        ports.handles.save(&handle).await?;

        if let Err(e) = ports
            .status
            .write(subject_id, StatusValue::AwaitingPayment)
            .await
        {
            self.inner.clear_handle(&correlation_id).await;
            return Err(e);
        }

        if let Err(e) = ports.checkout.open(&correlation_id).await {
            if let Err(compensation) = self.inner.compensate(subject_id).await {
                warn!(subject_id, error = %compensation, "could not reset status after checkout failure");
            }
            self.inner.clear_handle(&correlation_id).await;
            return Err(e);
        }

        let mut slot = self.inner.slot.lock().await;
        let epoch = slot.halt();
        let mut session = OrchestrationSession::new(correlation_id.clone(), owner_id, subject_id);
        self.inner.enter(&mut session, Phase::AwaitingPayment);
        slot.session = Some(session);
        self.inner.spawn_driver(&mut slot, epoch, Stage::Payment);

        info!(%correlation_id, owner_id, subject_id, "payment session started");
        Ok(correlation_id)
    }

    /// Abandons the current payment attempt from any phase.
    ///
    /// Polling stops before anything else happens. The status register is
    /// reset to `neutral` only while it still reads `awaiting-payment`; an
    /// entitlement that was already granted is never rolled back here. If the
    /// reset itself fails the handle survives, so calling `cancel` again
    /// retries it.
    pub async fn cancel(&self) -> Result<()> {
        let _control = self.inner.control.lock().await;
        let ports = &self.inner.ports;

        let session = {
            let mut slot = self.inner.slot.lock().await;
            slot.halt();
            slot.session.take()
        };

        let target = match &session {
            Some(session) => Some((session.subject_id.clone(), session.correlation_id.clone())),
            None => ports
                .handles
                .load()
                .await?
                .map(|handle| (handle.subject_id, handle.correlation_id)),
        };

        let Some((subject_id, correlation_id)) = target else {
            debug!("cancel requested with nothing in flight");
            return Ok(());
        };

        let compensation = self.inner.compensate(&subject_id).await;
        match &compensation {
            Ok(_) => self.inner.clear_handle(&correlation_id).await,
            Err(e) => warn!(
                %correlation_id,
                error = %e,
                "status reset failed, handle kept so cancel can be retried"
            ),
        }

        if session.is_some_and(|session| session.phase != Phase::Idle) {
            self.inner.emit(OrchestratorEvent::PhaseChanged { phase: Phase::Idle });
        }
        info!(%correlation_id, subject_id = %subject_id, "payment session cancelled");

        compensation.map(|_| ())
    }

    /// Stops local polling but keeps the durable handle, for a host that is
    /// being backgrounded or shut down. A later `resume` picks the flow up.
    pub async fn suspend(&self) {
        let _control = self.inner.control.lock().await;
        let mut slot = self.inner.slot.lock().await;
        slot.halt();
        if let Some(session) = slot.session.take() {
            info!(
                correlation_id = %session.correlation_id,
                phase = %session.phase,
                "payment session suspended"
            );
        }
    }
}

impl Inner {
    pub(crate) fn emit(&self, event: OrchestratorEvent) {
        debug!(?event, "publishing orchestrator event");
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn enter(&self, session: &mut OrchestrationSession, phase: Phase) {
        if session.phase == phase {
            return;
        }
        info!(
            correlation_id = %session.correlation_id,
            from = %session.phase,
            to = %phase,
            "phase transition"
        );
        session.phase = phase;
        self.emit(OrchestratorEvent::PhaseChanged { phase });
    }

    /// Moves the session to `Failed`. The handle is kept for a manual retry
    /// but marked so that `resume` leaves it alone.
    pub(crate) async fn fail(&self, session: &mut OrchestrationSession, reason: &str) {
        self.mark_handle_failed(&session.correlation_id).await;
        self.enter(session, Phase::Failed);
        if session.claim_failure_notice() {
            self.emit(OrchestratorEvent::FailedOnce {
                reason: reason.to_string(),
            });
        }
    }

    async fn mark_handle_failed(&self, correlation_id: &CorrelationId) {
        let marked: Result<()> = async {
            match self.ports.handles.load().await? {
                Some(mut handle) if &handle.correlation_id == correlation_id => {
                    handle.failed = true;
                    self.ports.handles.save(&handle).await
                }
                _ => Ok(()),
            }
        }
        .await;
        if let Err(e) = marked {
            warn!(%correlation_id, error = %e, "failed to mark local durable handle as failed");
        }
    }

    /// Moves the session to `Succeeded`, clearing its handle before anything
    /// is published.
    pub(crate) async fn succeed(&self, session: &mut OrchestrationSession) {
        self.clear_handle(&session.correlation_id).await;
        if session.claim_completion_notice() {
            self.emit(OrchestratorEvent::SucceededOnce {
                correlation_id: session.correlation_id.clone(),
            });
        }
        self.enter(session, Phase::Succeeded);
    }

    /// Resets the status register to `neutral` iff payment never progressed.
    ///
    /// Returns whether the compensating write was applied.
    pub(crate) async fn compensate(&self, subject_id: &str) -> Result<bool> {
        let status = self.ports.status.read(subject_id).await?;
        if status == StatusValue::AwaitingPayment {
            self.ports
                .status
                .write(subject_id, StatusValue::Neutral)
                .await?;
            info!(subject_id, "status register reset to neutral");
            Ok(true)
        } else {
            debug!(subject_id, %status, "payment already progressed, status left untouched");
            Ok(false)
        }
    }

    pub(crate) async fn clear_handle(&self, correlation_id: &CorrelationId) {
        if let Err(e) = self.ports.handles.clear(correlation_id).await {
            warn!(%correlation_id, error = %e, "failed to clear local durable handle");
        }
    }
}
