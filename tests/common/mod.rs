#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::config::OrchestratorConfig;
use payflow::domain::event::OrchestratorEvent;
use payflow::domain::handle::CorrelationId;
use payflow::domain::ports::{
    ArtifactStore, ArtifactStoreRef, CheckoutRedirector, CheckoutRedirectorRef, Collaborators,
    StatusRegister, StatusRegisterRef,
};
use payflow::domain::session::Phase;
use payflow::domain::status::StatusValue;
use payflow::error::{OrchestratorError, Result};
use payflow::infrastructure::clock::ManualClock;
use payflow::infrastructure::in_memory::{
    InMemoryArtifactStore, InMemoryCorrelationStore, InMemoryEntitlementLedger,
    InMemoryHandleStore, InMemoryStatusRegister, RecordingCheckout, RecordingGenerationTrigger,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

pub const OWNER: &str = "owner1";
pub const SUBJECT: &str = "proj1";
pub const ARTIFACTS: [&str; 4] = [
    "executive_summary",
    "market_analysis",
    "financial_plan",
    "operations_plan",
];

/// One poll interval under the default configuration.
pub const TICK: Duration = Duration::from_secs(4);

/// In-memory collaborators wired to a single orchestrator.
///
/// Every field is a cheap clone sharing state with the ports the orchestrator
/// sees, so tests can play the external systems and inspect what was called.
pub struct Harness {
    pub orchestrator: PaymentOrchestrator,
    pub ports: Collaborators,
    pub config: OrchestratorConfig,
    pub correlations: InMemoryCorrelationStore,
    pub register: InMemoryStatusRegister,
    pub artifacts: InMemoryArtifactStore,
    pub ledger: InMemoryEntitlementLedger,
    pub trigger: RecordingGenerationTrigger,
    pub checkout: RecordingCheckout,
    pub handles: InMemoryHandleStore,
    pub clock: ManualClock,
}

pub struct Overrides {
    pub status: Option<StatusRegisterRef>,
    pub artifacts: Option<ArtifactStoreRef>,
    pub checkout: Option<CheckoutRedirectorRef>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Overrides {
            status: None,
            artifacts: None,
            checkout: None,
        })
    }

    pub fn with(overrides: Overrides) -> Self {
        let config = OrchestratorConfig::default();
        let correlations = InMemoryCorrelationStore::new();
        let register = InMemoryStatusRegister::new();
        let artifacts = InMemoryArtifactStore::new(ARTIFACTS);
        let ledger = InMemoryEntitlementLedger::new();
        let trigger = RecordingGenerationTrigger::new();
        let checkout = RecordingCheckout::new();
        let handles = InMemoryHandleStore::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());

        let ports = Collaborators {
            correlations: Arc::new(correlations.clone()),
            checkout: overrides
                .checkout
                .unwrap_or_else(|| Arc::new(checkout.clone())),
            status: overrides
                .status
                .unwrap_or_else(|| Arc::new(register.clone())),
            artifacts: overrides
                .artifacts
                .unwrap_or_else(|| Arc::new(artifacts.clone())),
            ledger: Arc::new(ledger.clone()),
            generation: Arc::new(trigger.clone()),
            handles: Arc::new(handles.clone()),
            clock: Arc::new(clock.clone()),
        };

        Self {
            orchestrator: PaymentOrchestrator::new(ports.clone(), config.clone()),
            ports,
            config,
            correlations,
            register,
            artifacts,
            ledger,
            trigger,
            checkout,
            handles,
            clock,
        }
    }

    /// A second orchestrator over the same external systems, as a second
    /// tab or a restarted process would have.
    pub fn another_instance(&self) -> PaymentOrchestrator {
        PaymentOrchestrator::new(self.ports.clone(), self.config.clone())
    }

    pub async fn populate(&self, names: &[&str]) {
        for name in names {
            self.artifacts.put(SUBJECT, name, "content").await;
        }
    }
}

/// Status register that answers reads from a script before falling back to
/// the wrapped register.
pub struct ScriptedStatusRegister {
    inner: InMemoryStatusRegister,
    script: Mutex<VecDeque<StatusValue>>,
    reads: AtomicUsize,
}

impl ScriptedStatusRegister {
    pub fn new(inner: InMemoryStatusRegister, script: Vec<StatusValue>) -> Self {
        Self {
            inner,
            script: Mutex::new(script.into()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusRegister for ScriptedStatusRegister {
    async fn read(&self, subject_id: &str) -> Result<StatusValue> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(value) = self.script.lock().await.pop_front() {
            return Ok(value);
        }
        self.inner.read(subject_id).await
    }

    async fn write(&self, subject_id: &str, value: StatusValue) -> Result<()> {
        self.inner.write(subject_id, value).await
    }
}

/// Status register that can hold one read open until the test releases it,
/// leaving a poll tick in flight.
pub struct GatedStatusRegister {
    inner: InMemoryStatusRegister,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStatusRegister {
    pub fn new(inner: InMemoryStatusRegister) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// The next read parks until `release`.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl StatusRegister for GatedStatusRegister {
    async fn read(&self, subject_id: &str) -> Result<StatusValue> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.read(subject_id).await
    }

    async fn write(&self, subject_id: &str, value: StatusValue) -> Result<()> {
        self.inner.write(subject_id, value).await
    }
}

/// Artifact store where the pipeline finishes one more artifact right before
/// every read.
pub struct ProgressiveArtifactStore {
    inner: InMemoryArtifactStore,
    pending: Mutex<VecDeque<&'static str>>,
    reads: AtomicUsize,
}

impl ProgressiveArtifactStore {
    pub fn new(inner: InMemoryArtifactStore, pending: Vec<&'static str>) -> Self {
        Self {
            inner,
            pending: Mutex::new(pending.into()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for ProgressiveArtifactStore {
    async fn is_complete(&self, subject_id: &str) -> Result<bool> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.pending.lock().await.pop_front() {
            self.inner.put(subject_id, name, "generated").await;
        }
        self.inner.is_complete(subject_id).await
    }
}

pub struct FailingCheckout;

#[async_trait]
impl CheckoutRedirector for FailingCheckout {
    async fn open(&self, _correlation_id: &CorrelationId) -> Result<()> {
        Err(OrchestratorError::collaborator(
            "open checkout",
            "provider unreachable",
        ))
    }
}

/// Collects events until `phase` is entered, returning everything seen.
pub async fn wait_for_phase(
    events: &mut Receiver<OrchestratorEvent>,
    phase: Phase,
) -> Vec<OrchestratorEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out waiting for phase")
            .expect("event stream closed");
        let reached = event == OrchestratorEvent::PhaseChanged { phase };
        seen.push(event);
        if reached {
            return seen;
        }
    }
}

/// Events already published and not yet received.
pub fn drain(events: &mut Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
        }
    }
}

pub fn phase_changed(phase: Phase) -> OrchestratorEvent {
    OrchestratorEvent::PhaseChanged { phase }
}

pub fn count(events: &[OrchestratorEvent], wanted: &OrchestratorEvent) -> usize {
    events.iter().filter(|event| *event == wanted).count()
}
