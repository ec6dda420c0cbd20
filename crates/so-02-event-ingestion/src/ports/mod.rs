//! # Ports Layer (Hexagonal Architecture)
//!
//! Outbound ports for ledger subscriptions and checkpoint persistence.

pub mod outbound;

pub use outbound::*;
