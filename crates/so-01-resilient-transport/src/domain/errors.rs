//! # Domain Errors
//!
//! `AttemptError` describes one failed try; `TransportError` is what callers of
//! the transport see once the budget is spent.

use thiserror::Error;

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// Server answered with a non-2xx status.
    #[error("HTTP status {code}: {body}")]
    Status {
        /// Status code.
        code: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The JSON-RPC response carried an error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Connection, timeout or decode failure.
    #[error("{0}")]
    Failure(String),
}

/// Errors surfaced by the resilient transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Every attempt failed.
    #[error("Transport exhausted: {operation} failed after {attempts} attempts, last error: {last}")]
    Exhausted {
        /// Name of the operation (RPC method).
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// Last observed failure.
        last: AttemptError,
    },
}

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("Failed to build HTTP client for {url}: {source}")]
pub struct ClientBuildError {
    /// Endpoint the client was meant for.
    pub url: String,
    /// Underlying builder failure.
    #[source]
    pub source: reqwest::Error,
}

impl TransportError {
    /// Last observed failure.
    pub fn last_error(&self) -> &AttemptError {
        match self {
            TransportError::Exhausted { last, .. } => last,
        }
    }
}
