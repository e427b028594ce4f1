use crate::domain::credits::{CreditBalance, Credits};
use crate::domain::handle::{CorrelationId, IdempotencyKey, LocalDurableHandle};
use crate::domain::ports::{
    ArtifactStore, CheckoutRedirector, CorrelationStore, EntitlementLedger, GenerationTrigger,
    HandleStore, StatusRegister,
};
use crate::domain::status::StatusValue;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Where the provider's side of a correlation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationRecord {
    pub owner_id: String,
    pub subject_id: String,
    pub status: CorrelationStatus,
    pub created_at: DateTime<Utc>,
}

/// Correlation store issuing sequential IDs (`c1`, `c2`, …).
#[derive(Default, Clone)]
pub struct InMemoryCorrelationStore {
    records: Arc<RwLock<HashMap<CorrelationId, CorrelationRecord>>>,
    next: Arc<AtomicU64>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, correlation_id: &CorrelationId) -> Option<CorrelationRecord> {
        self.records.read().await.get(correlation_id).cloned()
    }

    /// Records the provider echoing the correlation back as paid. Returns
    /// whether the correlation was known.
    pub async fn mark_paid(&self, correlation_id: &CorrelationId) -> bool {
        match self.records.write().await.get_mut(correlation_id) {
            Some(record) => {
                record.status = CorrelationStatus::Paid;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn register(&self, owner_id: &str, subject_id: &str) -> Result<CorrelationId> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let correlation_id = CorrelationId::new(format!("c{id}"));
        let record = CorrelationRecord {
            owner_id: owner_id.to_string(),
            subject_id: subject_id.to_string(),
            status: CorrelationStatus::Pending,
            created_at: Utc::now(),
        };
        self.records
            .write()
            .await
            .insert(correlation_id.clone(), record);
        Ok(correlation_id)
    }
}

/// Status register keyed by subject. Unknown subjects read as `neutral`.
///
/// `set` plays the part of the external workflow; only writes arriving
/// through the port are recorded in `writes`.
#[derive(Default, Clone)]
pub struct InMemoryStatusRegister {
    values: Arc<RwLock<HashMap<String, StatusValue>>>,
    writes: Arc<RwLock<Vec<(String, StatusValue)>>>,
    failing_reads: Arc<AtomicUsize>,
}

impl InMemoryStatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, subject_id: &str, value: StatusValue) {
        self.values
            .write()
            .await
            .insert(subject_id.to_string(), value);
    }

    pub async fn value(&self, subject_id: &str) -> StatusValue {
        self.values
            .read()
            .await
            .get(subject_id)
            .cloned()
            .unwrap_or(StatusValue::Neutral)
    }

    pub async fn writes(&self) -> Vec<(String, StatusValue)> {
        self.writes.read().await.clone()
    }

    /// Makes the next `count` reads fail as if the backing store were down.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusRegister for InMemoryStatusRegister {
    async fn read(&self, subject_id: &str) -> Result<StatusValue> {
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OrchestratorError::collaborator(
                "read status",
                "status register unavailable",
            ));
        }
        Ok(self.value(subject_id).await)
    }

    async fn write(&self, subject_id: &str, value: StatusValue) -> Result<()> {
        self.writes
            .write()
            .await
            .push((subject_id.to_string(), value.clone()));
        self.set(subject_id, value).await;
        Ok(())
    }
}

/// Artifact records for every subject, checked against a fixed name set.
#[derive(Clone)]
pub struct InMemoryArtifactStore {
    required: Arc<Vec<String>>,
    records: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl InMemoryArtifactStore {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: Arc::new(required.into_iter().map(Into::into).collect()),
            records: Arc::default(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub async fn put(&self, subject_id: &str, name: &str, content: impl Into<String>) {
        self.records
            .write()
            .await
            .insert((subject_id.to_string(), name.to_string()), content.into());
    }

    pub async fn remove(&self, subject_id: &str, name: &str) {
        self.records
            .write()
            .await
            .remove(&(subject_id.to_string(), name.to_string()));
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn is_complete(&self, subject_id: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(self.required.iter().all(|name| {
            records
                .get(&(subject_id.to_string(), name.clone()))
                .is_some_and(|content| !content.is_empty())
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub owner_id: String,
    pub credits: Credits,
}

/// Ledger that credits each idempotency key at most once.
#[derive(Default, Clone)]
pub struct InMemoryEntitlementLedger {
    grants: Arc<RwLock<HashMap<IdempotencyKey, Grant>>>,
    balances: Arc<RwLock<HashMap<String, CreditBalance>>>,
    attempts: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEntitlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn balance(&self, owner_id: &str) -> CreditBalance {
        self.balances
            .read()
            .await
            .get(owner_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn grants(&self) -> HashMap<IdempotencyKey, Grant> {
        self.grants.read().await.clone()
    }

    /// Number of `allocate` calls received, duplicates included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntitlementLedger for InMemoryEntitlementLedger {
    async fn allocate(
        &self,
        owner_id: &str,
        credits: Credits,
        key: &IdempotencyKey,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrchestratorError::collaborator(
                "allocate entitlement",
                "ledger unavailable",
            ));
        }

        let mut grants = self.grants.write().await;
        if grants.contains_key(key) {
            return Ok(());
        }
        grants.insert(
            key.clone(),
            Grant {
                owner_id: owner_id.to_string(),
                credits,
            },
        );
        *self
            .balances
            .write()
            .await
            .entry(owner_id.to_string())
            .or_default() += CreditBalance::from(credits);
        Ok(())
    }
}

/// Checkout redirector that only remembers which correlation IDs it opened.
#[derive(Default, Clone)]
pub struct RecordingCheckout {
    opened: Arc<RwLock<Vec<CorrelationId>>>,
}

impl RecordingCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn opened(&self) -> Vec<CorrelationId> {
        self.opened.read().await.clone()
    }
}

#[async_trait]
impl CheckoutRedirector for RecordingCheckout {
    async fn open(&self, correlation_id: &CorrelationId) -> Result<()> {
        self.opened.write().await.push(correlation_id.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingGenerationTrigger {
    calls: Arc<RwLock<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingGenerationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(subject_id, owner_id)` pairs in call order.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.read().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationTrigger for RecordingGenerationTrigger {
    async fn trigger(&self, subject_id: &str, owner_id: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::collaborator(
                "trigger generation",
                "pipeline rejected the request",
            ));
        }
        self.calls
            .write()
            .await
            .push((subject_id.to_string(), owner_id.to_string()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryHandleStore {
    handle: Arc<RwLock<Option<LocalDurableHandle>>>,
}

impl InMemoryHandleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HandleStore for InMemoryHandleStore {
    async fn load(&self) -> Result<Option<LocalDurableHandle>> {
        Ok(self.handle.read().await.clone())
    }

    async fn save(&self, handle: &LocalDurableHandle) -> Result<()> {
        *self.handle.write().await = Some(handle.clone());
        Ok(())
    }

    async fn clear(&self, correlation_id: &CorrelationId) -> Result<()> {
        let mut handle = self.handle.write().await;
        if handle
            .as_ref()
            .is_some_and(|stored| &stored.correlation_id == correlation_id)
        {
            *handle = None;
        }
        Ok(())
    }
}
