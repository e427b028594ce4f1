use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::config::OrchestratorConfig;
use payflow::domain::event::OrchestratorEvent;
use payflow::domain::ports::{Clock, Collaborators, HandleStore, HandleStoreRef};
use payflow::domain::session::Phase;
use payflow::infrastructure::clock::SystemClock;
use payflow::infrastructure::file_handle::FileHandleStore;
use payflow::infrastructure::in_memory::{
    InMemoryArtifactStore, InMemoryCorrelationStore, InMemoryEntitlementLedger,
    InMemoryHandleStore, InMemoryStatusRegister,
};
use payflow::infrastructure::simulated::{SimulatedCheckout, SimulatedPipeline};
use payflow::interfaces::json::event_writer::EventWriter;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Orchestrator configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive one payment against a simulated provider and pipeline, printing
    /// every orchestrator event as a JSON line.
    Run {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        subject: String,

        /// Persist the local durable handle here instead of in memory.
        #[arg(long)]
        handle_file: Option<PathBuf>,

        /// Delay before the simulated provider acknowledges payment.
        #[arg(long, default_value_t = 1_000)]
        payment_delay_ms: u64,

        /// Delay between simulated artifacts being generated.
        #[arg(long, default_value_t = 500)]
        artifact_step_ms: u64,
    },
    /// Print the persisted handle and whether a resume would discard it.
    Inspect {
        #[arg(long)]
        handle_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => OrchestratorConfig::load(path).into_diagnostic()?,
        None => OrchestratorConfig::default(),
    };

    match cli.command {
        Command::Run {
            owner,
            subject,
            handle_file,
            payment_delay_ms,
            artifact_step_ms,
        } => {
            let handles: HandleStoreRef = match handle_file {
                Some(path) => Arc::new(FileHandleStore::new(path)),
                None => Arc::new(InMemoryHandleStore::new()),
            };
            run(
                config,
                handles,
                &owner,
                &subject,
                Duration::from_millis(payment_delay_ms),
                Duration::from_millis(artifact_step_ms),
            )
            .await
        }
        Command::Inspect { handle_file } => inspect(config, handle_file).await,
    }
}

async fn run(
    config: OrchestratorConfig,
    handles: HandleStoreRef,
    owner: &str,
    subject: &str,
    payment_delay: Duration,
    artifact_step: Duration,
) -> Result<()> {
    let correlations = InMemoryCorrelationStore::new();
    let register = InMemoryStatusRegister::new();
    let artifacts = InMemoryArtifactStore::new(config.artifacts.clone());

    let ports = Collaborators {
        correlations: Arc::new(correlations.clone()),
        checkout: Arc::new(SimulatedCheckout::new(
            correlations,
            register.clone(),
            payment_delay,
        )),
        status: Arc::new(register.clone()),
        artifacts: Arc::new(artifacts.clone()),
        ledger: Arc::new(InMemoryEntitlementLedger::new()),
        generation: Arc::new(SimulatedPipeline::new(register, artifacts, artifact_step)),
        handles,
        clock: Arc::new(SystemClock),
    };

    let orchestrator = PaymentOrchestrator::new(ports, config);
    let mut events = orchestrator.subscribe();
    orchestrator.start(owner, subject).await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = EventWriter::new(stdout.lock());
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        writer.write_event(&event).into_diagnostic()?;

        match event {
            OrchestratorEvent::PhaseChanged {
                phase: Phase::Succeeded,
            }
            | OrchestratorEvent::PhaseChanged { phase: Phase::Idle } => break,
            OrchestratorEvent::FailedOnce { reason } => return Err(miette!("{reason}")),
            _ => {}
        }
    }
    Ok(())
}

async fn inspect(config: OrchestratorConfig, handle_file: PathBuf) -> Result<()> {
    let store = FileHandleStore::new(handle_file);
    let handle = store.load().await.into_diagnostic()?;
    let stale = handle
        .as_ref()
        .is_some_and(|handle| handle.is_stale(SystemClock.now(), config.staleness_ttl()));

    let report = serde_json::json!({ "handle": handle, "stale": stale });
    println!("{report}");
    Ok(())
}
