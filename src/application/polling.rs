//! The driver task behind a live session.
//!
//! A driver runs Poll Loop A (payment acknowledgement), fires the one-shot
//! side effect, then runs Poll Loop B (generation completion). Every tick
//! re-acquires the slot lock and checks its epoch first, so once `Slot::halt`
//! has run no tick that was already in flight can touch the session.

use super::orchestrator::{Inner, Slot};
use crate::domain::event::OrchestratorEvent;
use crate::domain::session::Phase;
use crate::domain::status::StatusValue;
use crate::error::Result;
use std::sync::Arc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

const PAYMENT_FAILED: &str = "payment could not be confirmed, please retry";
const GENERATION_FAILED: &str = "generation could not be started, please retry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Payment,
    Generation,
}

enum Tick {
    Continue,
    Advance,
    Stop,
}

impl Inner {
    pub(crate) fn spawn_driver(self: &Arc<Self>, slot: &mut Slot, epoch: u64, stage: Stage) {
        let inner = Arc::clone(self);
        slot.attach(tokio::spawn(async move { inner.drive(epoch, stage).await }));
    }

    async fn drive(self: Arc<Self>, epoch: u64, stage: Stage) {
        if stage == Stage::Payment {
            if !self.await_payment(epoch).await {
                return;
            }
            if !self.fire_side_effect(epoch).await {
                return;
            }
        }
        self.await_generation(epoch).await;
    }

    /// Fixed-interval ticker whose first tick lands one period from now.
    fn ticker(&self) -> Interval {
        let period = self.config.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn live_subject(&self, epoch: u64) -> Option<String> {
        let mut slot = self.slot.lock().await;
        slot.live(epoch).map(|session| session.subject_id.clone())
    }

    /// Poll Loop A. Returns `true` once this driver has claimed the side effect.
    async fn await_payment(&self, epoch: u64) -> bool {
        let Some(subject_id) = self.live_subject(epoch).await else {
            return false;
        };
        let mut ticker = self.ticker();

        loop {
            ticker.tick().await;
            let status = match self.ports.status.read(&subject_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(subject_id = %subject_id, error = %e, "status read failed, retrying on next tick");
                    continue;
                }
            };

            match self.observe_payment(epoch, status).await {
                Tick::Continue => continue,
                Tick::Advance => return true,
                Tick::Stop => return false,
            }
        }
    }

    async fn observe_payment(&self, epoch: u64, status: StatusValue) -> Tick {
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.live(epoch) else {
            return Tick::Stop;
        };
        if session.phase != Phase::AwaitingPayment {
            return Tick::Stop;
        }

        match status {
            StatusValue::AwaitingPayment => {
                debug!(correlation_id = %session.correlation_id, "payment still pending");
                Tick::Continue
            }
            StatusValue::PaymentAcknowledged => {
                if !session.claim_side_effect() {
                    debug!(correlation_id = %session.correlation_id, "side effect already claimed");
                    return Tick::Stop;
                }
                self.enter(session, Phase::FiringSideEffect);
                Tick::Advance
            }
            StatusValue::Neutral => {
                info!(correlation_id = %session.correlation_id, "payment flow reset externally");
                let correlation_id = session.correlation_id.clone();
                self.clear_handle(&correlation_id).await;
                self.enter(session, Phase::Idle);
                slot.session = None;
                Tick::Stop
            }
            StatusValue::EntitlementActive => {
                info!(
                    correlation_id = %session.correlation_id,
                    "entitlement already active, skipping side effect"
                );
                self.succeed(session).await;
                Tick::Stop
            }
            StatusValue::Unrecognized(raw) => {
                error!(
                    correlation_id = %session.correlation_id,
                    status = %raw,
                    "unrecognized status value from payment workflow"
                );
                self.fail(session, PAYMENT_FAILED).await;
                Tick::Stop
            }
        }
    }

    /// Allocates credits and starts generation, outside the slot lock.
    ///
    /// The ledger call carries the session's idempotency key, so a duplicate
    /// allocation from another orchestrator instance is absorbed upstream.
    async fn fire_side_effect(&self, epoch: u64) -> bool {
        let (owner_id, subject_id, key) = {
            let mut slot = self.slot.lock().await;
            let Some(session) = slot.live(epoch) else {
                return false;
            };
            (
                session.owner_id.clone(),
                session.subject_id.clone(),
                session.idempotency_key(),
            )
        };

        let outcome: Result<()> = async {
            self.ports
                .ledger
                .allocate(&owner_id, self.config.entitlement_credits, &key)
                .await?;
            self.ports.generation.trigger(&subject_id, &owner_id).await
        }
        .await;

        let mut slot = self.slot.lock().await;
        let Some(session) = slot.live(epoch) else {
            return false;
        };

        match outcome {
            Ok(()) => {
                info!(correlation_id = %session.correlation_id, %key, "credits allocated, generation triggered");
                self.enter(session, Phase::AwaitingGeneration);
                if session.claim_success_notice() {
                    self.emit(OrchestratorEvent::PaymentConfirmed {
                        correlation_id: session.correlation_id.clone(),
                    });
                }
                true
            }
            Err(e) => {
                // The handle stays behind, marked failed, until cancel or a fresh start.
                error!(correlation_id = %session.correlation_id, error = %e, "side effect failed");
                self.fail(session, GENERATION_FAILED).await;
                false
            }
        }
    }

    /// Poll Loop B. Completeness is re-read from scratch on every tick.
    async fn await_generation(&self, epoch: u64) {
        let Some(subject_id) = self.live_subject(epoch).await else {
            return;
        };
        let mut ticker = self.ticker();

        loop {
            ticker.tick().await;
            let complete = match self.ports.artifacts.is_complete(&subject_id).await {
                Ok(complete) => complete,
                Err(e) => {
                    warn!(subject_id = %subject_id, error = %e, "artifact read failed, retrying on next tick");
                    continue;
                }
            };

            let mut slot = self.slot.lock().await;
            let Some(session) = slot.live(epoch) else {
                return;
            };
            if session.phase != Phase::AwaitingGeneration {
                return;
            }
            if !complete {
                debug!(correlation_id = %session.correlation_id, "artifacts incomplete");
                continue;
            }

            self.succeed(session).await;
            return;
        }
    }
}
