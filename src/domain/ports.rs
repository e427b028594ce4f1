use super::credits::Credits;
use super::handle::{CorrelationId, IdempotencyKey, LocalDurableHandle};
use super::status::StatusValue;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable record linking a correlation ID to an owner and subject.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn register(&self, owner_id: &str, subject_id: &str) -> Result<CorrelationId>;
}

/// Opens the external payment page; fire-and-forget.
#[async_trait]
pub trait CheckoutRedirector: Send + Sync {
    async fn open(&self, correlation_id: &CorrelationId) -> Result<()>;
}

#[async_trait]
pub trait StatusRegister: Send + Sync {
    async fn read(&self, subject_id: &str) -> Result<StatusValue>;
    async fn write(&self, subject_id: &str, value: StatusValue) -> Result<()>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// True iff every named artifact of the subject exists and is non-empty.
    async fn is_complete(&self, subject_id: &str) -> Result<bool>;
}

/// Credit ledger. Repeated calls with the same key must credit only once.
#[async_trait]
pub trait EntitlementLedger: Send + Sync {
    async fn allocate(&self, owner_id: &str, credits: Credits, key: &IdempotencyKey)
    -> Result<()>;
}

#[async_trait]
pub trait GenerationTrigger: Send + Sync {
    async fn trigger(&self, subject_id: &str, owner_id: &str) -> Result<()>;
}

/// Storage for the single local durable handle.
#[async_trait]
pub trait HandleStore: Send + Sync {
    async fn load(&self) -> Result<Option<LocalDurableHandle>>;
    /// Overwrites any previously stored handle.
    async fn save(&self, handle: &LocalDurableHandle) -> Result<()>;
    /// Removes the stored handle only if it carries `correlation_id`.
    async fn clear(&self, correlation_id: &CorrelationId) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type CorrelationStoreRef = Arc<dyn CorrelationStore>;
pub type CheckoutRedirectorRef = Arc<dyn CheckoutRedirector>;
pub type StatusRegisterRef = Arc<dyn StatusRegister>;
pub type ArtifactStoreRef = Arc<dyn ArtifactStore>;
pub type EntitlementLedgerRef = Arc<dyn EntitlementLedger>;
pub type GenerationTriggerRef = Arc<dyn GenerationTrigger>;
pub type HandleStoreRef = Arc<dyn HandleStore>;
pub type ClockRef = Arc<dyn Clock>;

/// The external systems an orchestrator is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub correlations: CorrelationStoreRef,
    pub checkout: CheckoutRedirectorRef,
    pub status: StatusRegisterRef,
    pub artifacts: ArtifactStoreRef,
    pub ledger: EntitlementLedgerRef,
    pub generation: GenerationTriggerRef,
    pub handles: HandleStoreRef,
    pub clock: ClockRef,
}
