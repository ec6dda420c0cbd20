//! # Event Source
//!
//! One event kind's live subscription exposed as a lazy, non-restartable
//! sequence of [`Event`]s.
//!
//! The subscription handle is released exactly once: when the sequence ends,
//! on [`EventSource::close`], or on drop, whichever happens first.
//!
//! Besides events, a source reports its watermark: the block up to which the
//! ledger has delivered every log of its kind.

use std::sync::Arc;

use shared_types::{BlockHeight, Event, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::{SourceError, SubscribeError};
use crate::ports::{LedgerNotification, LedgerSubscriber, SubscriptionId};

/// RAII guard over a ledger subscription.
struct SubscriptionGuard {
    id: SubscriptionId,
    subscriber: Arc<dyn LedgerSubscriber>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscriber.unsubscribe(self.id);
    }
}

/// One step of a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUpdate {
    /// Next event of the source's kind.
    Event(Event),
    /// The watermark advanced to this block.
    Synced(BlockHeight),
}

#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Disconnected(String),
}

/// Subscription wrapper for a single [`EventKind`].
pub struct EventSource {
    kind: EventKind,
    since_block: BlockHeight,
    notifications: mpsc::UnboundedReceiver<LedgerNotification>,
    guard: Option<SubscriptionGuard>,
    terminal: Option<Terminal>,
    delivered: u64,
    synced: Option<BlockHeight>,
}

impl EventSource {
    /// Register a subscription for `kind` starting at `since_block`.
    pub async fn open(
        subscriber: Arc<dyn LedgerSubscriber>,
        kind: EventKind,
        since_block: BlockHeight,
    ) -> Result<Self, SubscribeError> {
        let live = subscriber.subscribe(kind, since_block).await?;
        debug!(%kind, since_block, subscription = %live.id, "[so-02] Event source opened");

        Ok(Self {
            kind,
            since_block,
            notifications: live.notifications,
            guard: Some(SubscriptionGuard {
                id: live.id,
                subscriber,
            }),
            terminal: None,
            delivered: 0,
            synced: None,
        })
    }

    /// Kind this source watches.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// First block this source delivers.
    pub fn since_block(&self) -> BlockHeight {
        self.since_block
    }

    /// Events yielded so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Block up to which every log of this kind has been delivered.
    pub fn synced(&self) -> Option<BlockHeight> {
        self.synced
    }

    /// Whether the underlying subscription is still held.
    pub fn is_live(&self) -> bool {
        self.guard.is_some()
    }

    /// Wait for the next event.
    ///
    /// `Ok(None)` once the subscription has completed, `Err(Disconnected)` once
    /// it has dropped. Both are sticky: later calls return the same result.
    pub async fn next(&mut self) -> Result<Option<Event>, SourceError> {
        loop {
            match self.next_update().await? {
                Some(SourceUpdate::Event(event)) => return Ok(Some(event)),
                Some(SourceUpdate::Synced(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Wait for the next event or watermark advance.
    ///
    /// Terminal results are sticky as for [`EventSource::next`]. Watermarks
    /// are only reported when they move forward.
    pub async fn next_update(&mut self) -> Result<Option<SourceUpdate>, SourceError> {
        loop {
            if let Some(terminal) = &self.terminal {
                return match terminal {
                    Terminal::Completed => Ok(None),
                    Terminal::Disconnected(reason) => Err(SourceError::Disconnected {
                        kind: self.kind,
                        reason: reason.clone(),
                    }),
                };
            }

            match self.notifications.recv().await {
                Some(LedgerNotification::Log(event)) => {
                    if event.kind != self.kind || event.block_height < self.since_block {
                        trace!(
                            kind = %self.kind,
                            block = event.block_height,
                            "[so-02] Skipping log outside subscription range"
                        );
                        continue;
                    }
                    self.delivered += 1;
                    return Ok(Some(SourceUpdate::Event(event)));
                }
                Some(LedgerNotification::Synced(block)) => {
                    if self.synced.is_some_and(|s| block <= s) {
                        continue;
                    }
                    self.synced = Some(block);
                    return Ok(Some(SourceUpdate::Synced(block)));
                }
                Some(LedgerNotification::Dropped(reason)) => {
                    self.finish(Terminal::Disconnected(reason));
                }
                None => self.finish(Terminal::Completed),
            }
        }
    }

    /// Release the subscription now. Further `next` calls return `Ok(None)`.
    pub fn close(&mut self) {
        if self.terminal.is_none() {
            self.finish(Terminal::Completed);
        }
    }

    fn finish(&mut self, terminal: Terminal) {
        self.notifications.close();
        self.guard = None;
        self.terminal = Some(terminal);
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("kind", &self.kind)
            .field("since_block", &self.since_block)
            .field("live", &self.is_live())
            .field("delivered", &self.delivered)
            .field("synced", &self.synced)
            .finish()
    }
}
