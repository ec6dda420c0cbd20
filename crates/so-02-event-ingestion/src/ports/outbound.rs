//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the ingestion pipeline.
//!
//! Production: `WsLedgerSubscriber`, `FileCheckpointStore`
//! Testing: `InMemoryLedger`, `InMemoryCheckpointStore`

use std::fmt;

use async_trait::async_trait;
use shared_types::{BlockHeight, Event, EventKind};
use tokio::sync::mpsc;

use crate::domain::{Checkpoint, CheckpointError, SubscribeError};

/// Handle of one live ledger subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Notification delivered on a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerNotification {
    /// A matching log.
    Log(Event),
    /// Every log of the subscribed kind up to and including this block has
    /// been delivered.
    Synced(BlockHeight),
    /// The subscription broke; no further notifications follow.
    Dropped(String),
}

/// A registered subscription.
///
/// The channel closing without a `Dropped` notification means the
/// subscription completed normally.
#[derive(Debug)]
pub struct LiveSubscription {
    /// Handle to pass to [`LedgerSubscriber::unsubscribe`].
    pub id: SubscriptionId,
    /// Subscribed kind.
    pub kind: EventKind,
    /// Notifications in ledger log order.
    pub notifications: mpsc::UnboundedReceiver<LedgerNotification>,
}

/// Ledger subscription interface.
#[async_trait]
pub trait LedgerSubscriber: Send + Sync {
    /// Subscribe to `kind`, delivering logs from `since_block` onwards.
    async fn subscribe(
        &self,
        kind: EventKind,
        since_block: BlockHeight,
    ) -> Result<LiveSubscription, SubscribeError>;

    /// Release a subscription. Must be called exactly once per subscription.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Durable store for the last fully processed block and the state folded up
/// to it.
///
/// `write(c)` is only called with `c.last_processed_block` at or beyond the
/// stored value.
pub trait CheckpointStore: Send {
    /// Stored checkpoint, or `None` on first run.
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the stored checkpoint.
    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}
