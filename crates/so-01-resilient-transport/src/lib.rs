//! # SO-01 Resilient Transport
//!
//! Retrying execution of idempotent ledger calls.
//!
//! **Subsystem ID:** 01  
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Every RPC the oracle makes (reads such as "is a report due", and keyed writes
//! such as report submission) goes through [`ResilientTransport`], which retries
//! any failed attempt (non-2xx status, transport exception, JSON-RPC error) up to
//! a fixed budget with a fixed sleep between attempts.
//!
//! Only idempotent operations may be wrapped: a failed attempt must have had no
//! side effect, or its effect must be keyed so that a repeat is a no-op.
//!
//! ## Module Structure
//!
//! ```text
//! so-01-resilient-transport/
//! ├── domain/          # RetryPolicy, AttemptError, TransportError
//! ├── ports/           # LedgerRpc (+ MockLedgerRpc)
//! ├── adapters/        # HttpJsonRpc, RetryingRpc
//! └── transport.rs     # ResilientTransport
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod transport;

pub use adapters::{HttpJsonRpc, RetryingRpc};
pub use domain::{AttemptError, ClientBuildError, RetryPolicy, TransportError};
pub use ports::{LedgerRpc, MockLedgerRpc};
pub use transport::ResilientTransport;
