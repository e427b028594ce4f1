//! Stand-ins for the external payment workflow and generation pipeline.
//!
//! Both advance the shared in-memory register and artifact store from
//! background tasks, the way the real systems would while the orchestrator
//! is only polling.

use super::in_memory::{InMemoryArtifactStore, InMemoryCorrelationStore, InMemoryStatusRegister};
use crate::domain::handle::CorrelationId;
use crate::domain::ports::{CheckoutRedirector, GenerationTrigger};
use crate::domain::status::StatusValue;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Checkout whose "customer" pays `delay` after the page opens.
#[derive(Clone)]
pub struct SimulatedCheckout {
    correlations: InMemoryCorrelationStore,
    register: InMemoryStatusRegister,
    delay: Duration,
}

impl SimulatedCheckout {
    pub fn new(
        correlations: InMemoryCorrelationStore,
        register: InMemoryStatusRegister,
        delay: Duration,
    ) -> Self {
        Self {
            correlations,
            register,
            delay,
        }
    }
}

#[async_trait]
impl CheckoutRedirector for SimulatedCheckout {
    async fn open(&self, correlation_id: &CorrelationId) -> Result<()> {
        let record = self.correlations.get(correlation_id).await.ok_or_else(|| {
            OrchestratorError::collaborator(
                "open checkout",
                format!("unknown correlation {correlation_id}"),
            )
        })?;

        let correlations = self.correlations.clone();
        let register = self.register.clone();
        let correlation_id = correlation_id.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(subject_id = %record.subject_id, "simulated payment cleared");
            correlations.mark_paid(&correlation_id).await;
            register
                .set(&record.subject_id, StatusValue::PaymentAcknowledged)
                .await;
        });
        Ok(())
    }
}

/// Pipeline that fills one artifact every `step`, then activates the
/// entitlement on the register.
#[derive(Clone)]
pub struct SimulatedPipeline {
    register: InMemoryStatusRegister,
    artifacts: InMemoryArtifactStore,
    step: Duration,
}

impl SimulatedPipeline {
    pub fn new(
        register: InMemoryStatusRegister,
        artifacts: InMemoryArtifactStore,
        step: Duration,
    ) -> Self {
        Self {
            register,
            artifacts,
            step,
        }
    }
}

#[async_trait]
impl GenerationTrigger for SimulatedPipeline {
    async fn trigger(&self, subject_id: &str, owner_id: &str) -> Result<()> {
        debug!(subject_id, owner_id, "simulated generation started");
        let pipeline = self.clone();
        let subject_id = subject_id.to_string();
        tokio::spawn(async move {
            for name in pipeline.artifacts.required().to_vec() {
                tokio::time::sleep(pipeline.step).await;
                pipeline
                    .artifacts
                    .put(&subject_id, &name, format!("generated {name}"))
                    .await;
            }
            pipeline
                .register
                .set(&subject_id, StatusValue::EntitlementActive)
                .await;
        });
        Ok(())
    }
}
