//! # Ports Module
//!
//! Outbound dependency on the ledger node's RPC interface.

pub mod outbound;

pub use outbound::*;
