//! # Staking Oracle Runtime
//!
//! Wires the subsystems into one process.
//!
//! ```text
//! ledger node ──ws──▶ IngestionPipeline (so-02) ──fold──▶ ProtocolAggregator
//!      │                                                        │
//!      │                                                  report values
//!      │                                                        ▼
//!      └─────ws─────▶ forward_fulfillments (so-03) ──▶ UpkeepController (so-03)
//!                                                               │
//!                                                  RetryingRpc (so-01) ──http──▶ contract
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Read the checkpoint (resume point for both subscriptions)
//! 2. Spawn ingestion, the fulfillment forwarder and the controller
//! 3. Each task selects on the shared shutdown channel
//! 4. [`OracleTasks::supervise`] waits for the stop signal or for any task to
//!    exit on its own, whichever comes first, then stops the rest and
//!    collects every result

pub mod config;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use so_02_event_ingestion::{
    CheckpointStore, IngestionError, IngestionPipeline, IngestionProgress, IngestionSummary,
    LedgerSubscriber, ProtocolAggregator,
};
use so_03_upkeep_oracle::{
    forward_fulfillments, ForwarderError, TransmitterRegistry, UpkeepContract, UpkeepController,
    UpkeepStats,
};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

pub use config::{ConfigError, OracleConfig};

/// Fulfillments buffered between the forwarder and the controller.
const FULFILLMENT_BUFFER: usize = 64;

/// Everything the oracle needs, already constructed.
pub struct OracleRuntime<C> {
    config: OracleConfig,
    subscriber: Arc<dyn LedgerSubscriber>,
    contract: Arc<dyn UpkeepContract>,
    checkpoint: C,
    registry: TransmitterRegistry,
    aggregator: ProtocolAggregator,
}

impl<C: CheckpointStore + Sync + 'static> OracleRuntime<C> {
    /// Assemble a runtime.
    pub fn new(
        config: OracleConfig,
        subscriber: Arc<dyn LedgerSubscriber>,
        contract: Arc<dyn UpkeepContract>,
        checkpoint: C,
    ) -> Self {
        Self {
            config,
            subscriber,
            contract,
            checkpoint,
            registry: TransmitterRegistry::new(),
            aggregator: ProtocolAggregator::new(),
        }
    }

    /// Use `registry` instead of a private one.
    pub fn with_registry(mut self, registry: TransmitterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Handle on the folded protocol state.
    pub fn aggregator(&self) -> ProtocolAggregator {
        self.aggregator.clone()
    }

    /// Spawn every task. They run until `shutdown` flips to `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Result<OracleTasks> {
        self.config.validate().context("invalid configuration")?;
        let committed = self
            .checkpoint
            .read()
            .context("reading checkpoint")?
            .map(|checkpoint| checkpoint.last_processed_block);
        let resume =
            IngestionProgress::resume(committed, &[]).resume_block(self.config.deployment_block);

        let (sink, fulfillments) = mpsc::channel(FULFILLMENT_BUFFER);
        let mut controller = UpkeepController::new(
            &self.registry,
            self.contract,
            Arc::new(self.aggregator.clone()),
            fulfillments,
            self.config.upkeep(),
        )
        .context("starting upkeep controller")?;

        let pipeline = IngestionPipeline::new(
            self.subscriber.clone(),
            self.checkpoint,
            self.aggregator,
            self.config.ingestion(),
        );
        let ingestion = tokio::spawn(pipeline.run(shutdown.clone()));

        let forwarder = tokio::spawn(forward_fulfillments(
            self.subscriber,
            resume,
            self.config.max_resubscribe,
            sink,
            shutdown.clone(),
        ));

        let poll_interval = self.config.poll_interval;
        let upkeep = tokio::spawn(async move { controller.run(poll_interval, shutdown).await });

        info!(
            contract = %self.config.contract,
            resume_block = resume,
            poll_ms = poll_interval.as_millis() as u64,
            "Oracle tasks started"
        );
        Ok(OracleTasks {
            ingestion,
            forwarder,
            upkeep,
        })
    }
}

/// Join handles of the running tasks.
pub struct OracleTasks {
    ingestion: JoinHandle<Result<IngestionSummary, IngestionError>>,
    forwarder: JoinHandle<Result<u64, ForwarderError>>,
    upkeep: JoinHandle<UpkeepStats>,
}

/// Why the oracle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The stop signal fired.
    Signal,
    /// Ingestion returned before any stop signal.
    IngestionExited,
    /// The fulfillment forwarder returned before any stop signal.
    ForwarderExited,
    /// The upkeep controller returned before any stop signal.
    UpkeepExited,
}

/// What each task reported when it stopped.
#[derive(Debug)]
pub struct OracleReport {
    /// What ended the run.
    pub cause: StopCause,
    /// Ingestion result.
    pub ingestion: Result<IngestionSummary, IngestionError>,
    /// Fulfillments forwarded, or why the forwarder died.
    pub forwarded: Result<u64, ForwarderError>,
    /// Controller counters.
    pub upkeep: UpkeepStats,
}

impl OracleReport {
    /// Stopped on the signal with every task healthy.
    pub fn is_clean(&self) -> bool {
        self.cause == StopCause::Signal && self.ingestion.is_ok() && self.forwarded.is_ok()
    }
}

async fn collect<T>(
    done: Option<Result<T, JoinError>>,
    handle: JoinHandle<T>,
) -> Result<T, JoinError> {
    match done {
        Some(result) => result,
        None => handle.await,
    }
}

impl OracleTasks {
    /// Run until `signal` resolves or a task exits on its own, then flip
    /// `stop` and wait for every task.
    ///
    /// A task exiting early stops the others too: the oracle never keeps
    /// running with a dead subsystem.
    pub async fn supervise(
        mut self,
        stop: &watch::Sender<bool>,
        signal: impl Future<Output = ()>,
    ) -> Result<OracleReport> {
        let mut ingestion = None;
        let mut forwarder = None;
        let mut upkeep = None;

        let cause = tokio::select! {
            _ = signal => StopCause::Signal,
            done = &mut self.ingestion => {
                ingestion = Some(done);
                StopCause::IngestionExited
            }
            done = &mut self.forwarder => {
                forwarder = Some(done);
                StopCause::ForwarderExited
            }
            done = &mut self.upkeep => {
                upkeep = Some(done);
                StopCause::UpkeepExited
            }
        };
        match cause {
            StopCause::Signal => info!("Stop signal received, shutting down"),
            other => warn!(cause = ?other, "Task exited on its own, shutting down the rest"),
        }
        let _ = stop.send(true);

        let ingestion = collect(ingestion, self.ingestion)
            .await
            .context("ingestion task panicked")?;
        if let Err(e) = &ingestion {
            error!(error = %e, "[so-02] Ingestion failed");
        }
        let forwarded = collect(forwarder, self.forwarder)
            .await
            .context("forwarder task panicked")?;
        if let Err(e) = &forwarded {
            error!(error = %e, "[so-03] Fulfillment forwarder failed");
        }
        let upkeep = collect(upkeep, self.upkeep)
            .await
            .context("upkeep task panicked")?;

        Ok(OracleReport {
            cause,
            ingestion,
            forwarded,
            upkeep,
        })
    }
}
