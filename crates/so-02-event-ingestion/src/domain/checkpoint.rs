//! # Checkpoint Record
//!
//! What survives a restart: the last block whose events are all folded, and
//! the protocol state as of that block. The two are written together so a
//! resumed run continues the fold instead of restarting it from zero.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, ProtocolState};

/// Persisted ingestion progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Every event at or below this block is folded into `state`.
    pub last_processed_block: BlockHeight,
    /// Aggregate as of `last_processed_block`.
    pub state: ProtocolState,
}

impl Checkpoint {
    /// Checkpoint at `block` with an empty aggregate.
    pub fn at(block: BlockHeight) -> Self {
        Self {
            last_processed_block: block,
            state: ProtocolState::default(),
        }
    }
}
