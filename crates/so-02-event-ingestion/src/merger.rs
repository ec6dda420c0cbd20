//! # Stream Merger
//!
//! Fan-in of N independently progressing [`EventSource`]s into one feed, in
//! arrival order.
//!
//! ## Algorithm
//!
//! Each live source has exactly one pending `next()` future in a
//! `FuturesUnordered`. The future owns its source and hands it back together
//! with the result, so the read is reissued against the same source right
//! after each yield. Sources whose read completes or fails leave the pool;
//! the merge keeps going with the rest and ends only when the pool is empty.
//!
//! Watermark advances are passed through as [`MergeUpdate::Synced`] so the
//! consumer can tell when a block is complete across every kind. The
//! `Stream` view yields events only.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use shared_types::{BlockHeight, Event, EventKind};
use tracing::{info, warn};

use crate::domain::SourceError;
use crate::source::{EventSource, SourceUpdate};

type PendingRead = BoxFuture<'static, (EventSource, Result<Option<SourceUpdate>, SourceError>)>;

/// Why a source left the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossReason {
    /// The source's sequence ended.
    Completed,
    /// The source's subscription dropped.
    Disconnected(String),
}

/// A source that left the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostSource {
    /// Kind of the lost source.
    pub kind: EventKind,
    /// Events it delivered before leaving.
    pub delivered: u64,
    /// Why it left.
    pub reason: LossReason,
}

/// One step of the merged feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeUpdate {
    /// Next event from any source.
    Event(Event),
    /// A source's watermark advanced.
    Synced {
        /// Kind of the source.
        kind: EventKind,
        /// Every log of `kind` up to this block has been delivered.
        block: BlockHeight,
    },
    /// A source left the pool.
    Lost(LostSource),
}

/// Arrival-order merge over event sources.
#[derive(Default)]
pub struct StreamMerger {
    pending: FuturesUnordered<PendingRead>,
    lost: Vec<LostSource>,
}

fn read(mut source: EventSource) -> PendingRead {
    Box::pin(async move {
        let result = source.next_update().await;
        (source, result)
    })
}

impl StreamMerger {
    /// Empty merge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge over `sources`.
    pub fn from_sources(sources: impl IntoIterator<Item = EventSource>) -> Self {
        let mut merger = Self::new();
        for source in sources {
            merger.push(source);
        }
        merger
    }

    /// Add a source to the running merge.
    pub fn push(&mut self, source: EventSource) {
        self.pending.push(read(source));
    }

    /// Number of live sources.
    pub fn live_sources(&self) -> usize {
        self.pending.len()
    }

    /// Whether every source has left.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sources lost while the merge was driven as a `Stream`, since the last call.
    pub fn take_lost(&mut self) -> Vec<LostSource> {
        std::mem::take(&mut self.lost)
    }

    /// Next event, watermark advance or source loss. `None` once every source
    /// has left.
    pub async fn next_update(&mut self) -> Option<MergeUpdate> {
        futures::future::poll_fn(|cx| self.poll_update(cx)).await
    }

    fn poll_update(&mut self, cx: &mut Context<'_>) -> Poll<Option<MergeUpdate>> {
        let (source, result) = match self.pending.poll_next_unpin(cx) {
            Poll::Ready(Some(done)) => done,
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => return Poll::Pending,
        };

        let update = match result {
            Ok(Some(SourceUpdate::Event(event))) => {
                self.pending.push(read(source));
                MergeUpdate::Event(event)
            }
            Ok(Some(SourceUpdate::Synced(block))) => {
                let kind = source.kind();
                self.pending.push(read(source));
                MergeUpdate::Synced { kind, block }
            }
            Ok(None) => {
                info!(
                    kind = %source.kind(),
                    delivered = source.delivered(),
                    remaining = self.pending.len(),
                    "[so-02] Event source completed"
                );
                MergeUpdate::Lost(LostSource {
                    kind: source.kind(),
                    delivered: source.delivered(),
                    reason: LossReason::Completed,
                })
            }
            Err(SourceError::Disconnected { kind, reason }) => {
                warn!(
                    %kind,
                    %reason,
                    delivered = source.delivered(),
                    remaining = self.pending.len(),
                    "[so-02] Event source lost, merge continues with remaining sources"
                );
                MergeUpdate::Lost(LostSource {
                    kind,
                    delivered: source.delivered(),
                    reason: LossReason::Disconnected(reason),
                })
            }
        };
        Poll::Ready(Some(update))
    }
}

impl Stream for StreamMerger {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        loop {
            match this.poll_update(cx) {
                Poll::Ready(Some(MergeUpdate::Event(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(MergeUpdate::Synced { .. })) => {}
                Poll::Ready(Some(MergeUpdate::Lost(lost))) => this.lost.push(lost),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.pending.is_empty() {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}
