//! Shared handle over the folded [`ProtocolState`].
//!
//! The aggregate only becomes *ready* once every watched kind has caught up
//! with the chain head; before that its values describe some past block and
//! must not be reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{Event, EventDecodeError, ProtocolState, ReportValues};

/// Folds the merged feed into protocol state; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProtocolAggregator {
    state: Arc<RwLock<ProtocolState>>,
    ready: Arc<AtomicBool>,
}

impl ProtocolAggregator {
    /// Empty aggregate, not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state with one restored from a checkpoint.
    pub fn restore(&self, state: ProtocolState) {
        *self.state.write() = state;
    }

    /// Fold one event. A malformed payload leaves the state untouched.
    pub fn apply(&self, event: &Event) -> Result<(), EventDecodeError> {
        self.state.write().apply(event)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ProtocolState {
        self.state.read().clone()
    }

    /// Values a report would carry right now.
    pub fn report_values(&self) -> ReportValues {
        self.state.read().report_values()
    }

    /// Declare the aggregate caught up with the chain head.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Whether the aggregate has caught up with the chain head.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
