//! # Error Types
//!
//! Decoding errors shared by every subsystem that touches raw ledger data.

use alloy_primitives::B256;
use thiserror::Error;

use crate::entities::EventKind;

/// Errors turning a ledger log into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    /// The event is not of the kind the decoder expects.
    #[error("Wrong event kind: expected {expected}, got {got}")]
    WrongKind { expected: EventKind, got: EventKind },

    /// The event kind carries no single amount.
    #[error("Event kind {0} carries no amount")]
    NoAmount(EventKind),

    /// The log has no topics at all.
    #[error("Log has no event topic")]
    MissingTopic,

    /// Topic-0 does not belong to any known event kind.
    #[error("Unknown event topic: {0}")]
    UnknownTopic(B256),

    /// The node omitted a field a mined log always has.
    #[error("Log is missing {0}")]
    Unmined(&'static str),

    /// Malformed ABI payload.
    #[error("Malformed payload: {0}")]
    Abi(String),
}

impl From<alloy_sol_types::Error> for EventDecodeError {
    fn from(err: alloy_sol_types::Error) -> Self {
        EventDecodeError::Abi(err.to_string())
    }
}
