//! # Domain Errors
//!
//! Error types for the Event Ingestion subsystem.
//!
//! - `SourceError` is per source and never aborts the merge.
//! - `CheckpointError::Corrupt` is fatal at startup.

use std::io;
use std::path::PathBuf;

use shared_types::EventKind;
use thiserror::Error;

/// Failure of a single event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The underlying ledger subscription dropped.
    #[error("Source {kind} disconnected: {reason}")]
    Disconnected {
        /// Event kind the source was watching.
        kind: EventKind,
        /// Why the subscription ended.
        reason: String,
    },
}

impl SourceError {
    /// Kind of the failed source.
    pub fn kind(&self) -> EventKind {
        match self {
            SourceError::Disconnected { kind, .. } => *kind,
        }
    }
}

/// Failure to register a ledger subscription.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The subscription endpoint could not be reached.
    #[error("Failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint URL.
        url: String,
        /// Underlying error.
        reason: String,
    },

    /// The node refused the subscription.
    #[error("Subscription for {kind} rejected: {reason}")]
    Rejected {
        /// Requested kind.
        kind: EventKind,
        /// Node's error message.
        reason: String,
    },
}

/// Checkpoint persistence errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The persisted value is unreadable. Operator must intervene.
    #[error("Checkpoint at {} is corrupt: {content:?}", .path.display())]
    Corrupt {
        /// Checkpoint file.
        path: PathBuf,
        /// Offending content.
        content: String,
    },

    /// The checkpoint could not be serialized.
    #[error("Checkpoint for {} could not be encoded: {reason}", .path.display())]
    Encode {
        /// Checkpoint file.
        path: PathBuf,
        /// Serializer message.
        reason: String,
    },

    /// Another writer holds the checkpoint.
    #[error("Checkpoint at {} is locked by {}", .path.display(), holder(.pid))]
    Locked {
        /// Lock file.
        path: PathBuf,
        /// PID recorded by the holder, if readable.
        pid: Option<u32>,
    },

    /// Filesystem failure.
    #[error("Checkpoint I/O on {}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

fn holder(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!("process {pid}"),
        None => "another writer".to_string(),
    }
}

/// Fatal ingestion errors.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Checkpoint could not be read or written.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Initial subscription failed.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
}
