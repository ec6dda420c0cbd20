//! # Ingestion Pipeline
//!
//! Startup, steady state and shutdown of event ingestion.
//!
//! ```text
//! read checkpoint ──▶ restore folded state, resume = checkpoint + 1
//!        │
//!        ▼
//! open one EventSource per kind (concurrently) ──▶ StreamMerger
//!        │
//!        ▼
//! loop: next merged update
//!   Event  ──▶ dedup ──▶ hold in position order
//!   Synced ──▶ safe = min watermark ──▶ fold held events <= safe
//!                                   ──▶ write (safe, state) checkpoint
//!   Lost   ──▶ resubscribe from checkpoint + 1 (bounded) or stay degraded
//!   None   ──▶ every source completed, stop
//! shutdown signal ──▶ drop merger (releases every subscription)
//! ```
//!
//! Events are only folded once every kind has passed their block, so the fold
//! sees the merged feed in ledger order and the persisted state always matches
//! the persisted block. Held events are dropped at shutdown and replayed from
//! the checkpoint on the next run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::try_join_all;
use shared_types::{BlockHeight, Event, EventKind, LogPosition};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::aggregator::ProtocolAggregator;
use crate::domain::{Checkpoint, IngestionError, IngestionProgress};
use crate::merger::{LossReason, LostSource, MergeUpdate, StreamMerger};
use crate::ports::{CheckpointStore, LedgerSubscriber};
use crate::source::EventSource;

/// Default resubscription budget per kind.
pub const DEFAULT_MAX_RESUBSCRIBE: u32 = 3;

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionConfig {
    /// Kinds to watch.
    pub kinds: Vec<EventKind>,
    /// Block the contract was deployed in; the start point on first run.
    pub deployment_block: BlockHeight,
    /// Resubscriptions allowed per kind after a disconnect (0 disables).
    pub max_resubscribe: u32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            kinds: EventKind::STATE.to_vec(),
            deployment_block: 0,
            max_resubscribe: DEFAULT_MAX_RESUBSCRIBE,
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Block the run resumed from.
    pub resumed_from: BlockHeight,
    /// Events folded into the aggregate.
    pub events_applied: u64,
    /// Replayed events dropped by dedup.
    pub duplicates_skipped: u64,
    /// Events whose payload could not be decoded.
    pub malformed: u64,
    /// Checkpoint at the end of the run.
    pub checkpoint: Option<BlockHeight>,
    /// Admitted events still waiting for a lagging kind when the run ended.
    pub unsettled: usize,
    /// Successful resubscriptions.
    pub resubscriptions: u32,
    /// Kinds that were lost for good.
    pub degraded: Vec<EventKind>,
}

enum Step {
    Shutdown,
    Update(Option<MergeUpdate>),
}

/// Drives subscriptions, merge, fold and checkpoint.
///
/// Owns its checkpoint store: only one pipeline writes a given checkpoint.
pub struct IngestionPipeline<C> {
    subscriber: Arc<dyn LedgerSubscriber>,
    checkpoint: C,
    aggregator: ProtocolAggregator,
    config: IngestionConfig,
    held: BTreeMap<LogPosition, Event>,
}

impl<C: CheckpointStore> IngestionPipeline<C> {
    /// Assemble a pipeline.
    pub fn new(
        subscriber: Arc<dyn LedgerSubscriber>,
        checkpoint: C,
        aggregator: ProtocolAggregator,
        config: IngestionConfig,
    ) -> Self {
        Self {
            subscriber,
            checkpoint,
            aggregator,
            config,
            held: BTreeMap::new(),
        }
    }

    /// Run until shutdown is signalled or every source has completed.
    ///
    /// Fails on an unreadable checkpoint, an initial subscription failure or a
    /// checkpoint write failure. Lost sources only degrade the run.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<IngestionSummary, IngestionError> {
        let stored = self.checkpoint.read()?;
        let committed = stored.as_ref().map(|c| c.last_processed_block);
        if let Some(checkpoint) = stored {
            self.aggregator.restore(checkpoint.state);
        }

        let mut progress = IngestionProgress::resume(committed, &self.config.kinds);
        let resume = progress.resume_block(self.config.deployment_block);
        let mut summary = IngestionSummary {
            resumed_from: resume,
            checkpoint: committed,
            ..IngestionSummary::default()
        };
        info!(
            checkpoint = ?committed,
            resume_block = resume,
            kinds = self.config.kinds.len(),
            "[so-02] Starting ingestion"
        );

        let sources = try_join_all(
            self.config
                .kinds
                .iter()
                .map(|kind| EventSource::open(self.subscriber.clone(), *kind, resume)),
        )
        .await?;
        let mut merger = StreamMerger::from_sources(sources);
        let mut resubscribed: HashMap<EventKind, u32> = HashMap::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let step = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => Step::Shutdown,
                },
                update = merger.next_update() => Step::Update(update),
            };

            match step {
                Step::Shutdown => break,
                Step::Update(None) => {
                    info!("[so-02] Every event source completed");
                    break;
                }
                Step::Update(Some(MergeUpdate::Event(event))) => {
                    self.hold(event, &mut progress, &mut summary);
                }
                Step::Update(Some(MergeUpdate::Synced { kind, block })) => {
                    progress.sync(kind, block);
                    self.settle(&mut progress, &mut summary)?;
                }
                Step::Update(Some(MergeUpdate::Lost(lost))) => {
                    if lost.reason == LossReason::Completed {
                        progress.retire(lost.kind);
                        self.settle(&mut progress, &mut summary)?;
                    } else {
                        self.recover(lost, &progress, &mut merger, &mut resubscribed, &mut summary)
                            .await;
                    }
                }
            }
        }

        drop(merger);
        summary.checkpoint = progress.committed();
        summary.unsettled = self.held.len();
        info!(
            events_applied = summary.events_applied,
            duplicates = summary.duplicates_skipped,
            unsettled = summary.unsettled,
            checkpoint = ?summary.checkpoint,
            "[so-02] Ingestion stopped"
        );
        Ok(summary)
    }

    fn hold(&mut self, event: Event, progress: &mut IngestionProgress, summary: &mut IngestionSummary) {
        if !progress.admit(&event) {
            summary.duplicates_skipped += 1;
            debug!(
                kind = %event.kind,
                block = event.block_height,
                log_index = event.log_index,
                "[so-02] Skipping replayed event"
            );
            return;
        }
        self.held.insert(event.position(), event);
    }

    /// Fold everything the watermarks allow and persist the result.
    fn settle(
        &mut self,
        progress: &mut IngestionProgress,
        summary: &mut IngestionSummary,
    ) -> Result<(), IngestionError> {
        if let Some(safe) = progress.advance() {
            let ready = match safe.checked_add(1) {
                Some(next) => {
                    let later = self.held.split_off(&LogPosition {
                        block_height: next,
                        log_index: 0,
                    });
                    std::mem::replace(&mut self.held, later)
                }
                None => std::mem::take(&mut self.held),
            };

            for event in ready.into_values() {
                match self.aggregator.apply(&event) {
                    Ok(()) => summary.events_applied += 1,
                    Err(e) => {
                        summary.malformed += 1;
                        warn!(
                            kind = %event.kind,
                            block = event.block_height,
                            tx = %event.transaction_hash,
                            error = %e,
                            "[so-02] Event payload not decodable, not folded"
                        );
                    }
                }
            }

            let checkpoint = Checkpoint {
                last_processed_block: safe,
                state: self.aggregator.snapshot(),
            };
            self.checkpoint.write(&checkpoint).map_err(|e| {
                error!(block = safe, error = %e, "[so-02] Checkpoint write failed");
                e
            })?;
            progress.commit(safe);
            debug!(block = safe, held = self.held.len(), "[so-02] Checkpoint advanced");
        }

        if !self.aggregator.is_ready() && progress.all_synced() {
            self.aggregator.mark_ready();
            info!(checkpoint = ?progress.committed(), "[so-02] Caught up with chain head");
        }
        Ok(())
    }

    async fn recover(
        &self,
        lost: LostSource,
        progress: &IngestionProgress,
        merger: &mut StreamMerger,
        resubscribed: &mut HashMap<EventKind, u32>,
        summary: &mut IngestionSummary,
    ) {
        let used = resubscribed.entry(lost.kind).or_insert(0);
        if *used >= self.config.max_resubscribe {
            warn!(
                kind = %lost.kind,
                attempts = *used,
                remaining = merger.live_sources(),
                checkpoint = ?progress.committed(),
                "[so-02] Resubscribe budget spent, running degraded with checkpoint frozen"
            );
            summary.degraded.push(lost.kind);
            return;
        }
        *used += 1;

        let since = progress.resume_block(self.config.deployment_block);
        match EventSource::open(self.subscriber.clone(), lost.kind, since).await {
            Ok(source) => {
                info!(kind = %lost.kind, since, attempt = *used, "[so-02] Resubscribed");
                summary.resubscriptions += 1;
                merger.push(source);
            }
            Err(e) => {
                warn!(
                    kind = %lost.kind,
                    error = %e,
                    checkpoint = ?progress.committed(),
                    "[so-02] Resubscribe failed, running degraded with checkpoint frozen"
                );
                summary.degraded.push(lost.kind);
            }
        }
    }
}
