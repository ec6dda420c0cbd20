//! # Ports Module
//!
//! Outbound dependencies: the upkeep contract and the folded protocol state.

pub mod outbound;

pub use outbound::*;
