//! # In-Memory Adapters
//!
//! In-process ledger and checkpoint doubles for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{BlockHeight, Event, EventKind};
use tokio::sync::mpsc;

use crate::domain::{Checkpoint, CheckpointError, SubscribeError};
use crate::ports::{
    CheckpointStore, LedgerNotification, LedgerSubscriber, LiveSubscription, SubscriptionId,
};

// =============================================================================
// LEDGER
// =============================================================================

struct Subscriber {
    kind: EventKind,
    since_block: BlockHeight,
    sender: mpsc::UnboundedSender<LedgerNotification>,
}

#[derive(Default)]
struct LedgerInner {
    next_id: u64,
    /// Subscriptions the ledger still feeds.
    feeding: HashMap<SubscriptionId, Subscriber>,
    /// Subscriptions not yet released by their owner.
    unreleased: HashMap<SubscriptionId, EventKind>,
    history: Vec<Event>,
    head: Option<BlockHeight>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    double_releases: usize,
    rejected: Vec<EventKind>,
}

/// In-process ledger node.
///
/// New subscriptions first receive every published event of their kind at or
/// after `since_block` (the node's replay) and the mined head as their
/// watermark, then live events. Watermarks only move on [`InMemoryLedger::mine`]
/// and [`InMemoryLedger::sync_kind`].
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl InMemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `event` to every live subscription of its kind.
    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock();
        for sub in inner.feeding.values() {
            if sub.kind == event.kind && event.block_height >= sub.since_block {
                let _ = sub.sender.send(LedgerNotification::Log(event.clone()));
            }
        }
        inner.history.push(event);
    }

    /// Declare every block up to `block` complete for every live subscription.
    pub fn mine(&self, block: BlockHeight) {
        let mut inner = self.inner.lock();
        inner.head = Some(inner.head.map_or(block, |h| h.max(block)));
        for sub in inner.feeding.values() {
            let _ = sub.sender.send(LedgerNotification::Synced(block));
        }
    }

    /// Advance the watermark of `kind` alone, leaving the others behind.
    pub fn sync_kind(&self, kind: EventKind, block: BlockHeight) {
        let inner = self.inner.lock();
        for sub in inner.feeding.values().filter(|s| s.kind == kind) {
            let _ = sub.sender.send(LedgerNotification::Synced(block));
        }
    }

    /// Break every live subscription of `kind`.
    pub fn drop_kind(&self, kind: EventKind, reason: &str) {
        let mut inner = self.inner.lock();
        inner.feeding.retain(|_, sub| {
            if sub.kind == kind {
                let _ = sub.sender.send(LedgerNotification::Dropped(reason.to_string()));
                false
            } else {
                true
            }
        });
    }

    /// End every live subscription of `kind` normally.
    pub fn complete_kind(&self, kind: EventKind) {
        self.inner.lock().feeding.retain(|_, sub| sub.kind != kind);
    }

    /// Make subsequent subscriptions to `kind` fail.
    pub fn reject_kind(&self, kind: EventKind) {
        self.inner.lock().rejected.push(kind);
    }

    /// Subscriptions not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().unreleased.len()
    }

    /// Subscriptions of `kind` not yet released.
    pub fn active_subscriptions_of(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .unreleased
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Total `subscribe` calls that succeeded.
    pub fn subscribe_calls(&self) -> usize {
        self.inner.lock().subscribe_calls
    }

    /// Total `unsubscribe` calls.
    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.lock().unsubscribe_calls
    }

    /// `unsubscribe` calls for handles that were already released.
    pub fn double_releases(&self) -> usize {
        self.inner.lock().double_releases
    }
}

#[async_trait]
impl LedgerSubscriber for InMemoryLedger {
    async fn subscribe(
        &self,
        kind: EventKind,
        since_block: BlockHeight,
    ) -> Result<LiveSubscription, SubscribeError> {
        let mut inner = self.inner.lock();
        if inner.rejected.contains(&kind) {
            return Err(SubscribeError::Rejected {
                kind,
                reason: "rejected by in-memory ledger".to_string(),
            });
        }

        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        let (sender, notifications) = mpsc::unbounded_channel();

        for event in inner
            .history
            .iter()
            .filter(|e| e.kind == kind && e.block_height >= since_block)
        {
            let _ = sender.send(LedgerNotification::Log(event.clone()));
        }
        if let Some(head) = inner.head {
            let _ = sender.send(LedgerNotification::Synced(head));
        }

        inner.feeding.insert(
            id,
            Subscriber {
                kind,
                since_block,
                sender,
            },
        );
        inner.unreleased.insert(id, kind);
        inner.subscribe_calls += 1;

        Ok(LiveSubscription {
            id,
            kind,
            notifications,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        inner.unsubscribe_calls += 1;
        inner.feeding.remove(&id);
        if inner.unreleased.remove(&id).is_none() {
            inner.double_releases += 1;
        }
    }
}

// =============================================================================
// CHECKPOINT
// =============================================================================

/// Checkpoint held in memory. Clones share the value.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    value: Arc<Mutex<Option<Checkpoint>>>,
    writes: Arc<Mutex<Vec<BlockHeight>>>,
}

impl InMemoryCheckpointStore {
    /// Empty store (first run).
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `checkpoint`.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        *store.value.lock() = Some(checkpoint);
        store
    }

    /// Block of every checkpoint written, in order.
    pub fn writes(&self) -> Vec<BlockHeight> {
        self.writes.lock().clone()
    }

    /// Last processed block currently stored.
    pub fn block(&self) -> Option<BlockHeight> {
        self.value.lock().as_ref().map(|c| c.last_processed_block)
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.value.lock().clone())
    }

    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut value = self.value.lock();
        debug_assert!(value
            .as_ref()
            .map_or(true, |last| checkpoint.last_processed_block >= last.last_processed_block));
        *value = Some(checkpoint.clone());
        self.writes.lock().push(checkpoint.last_processed_block);
        Ok(())
    }
}
