//! # Shared Types Crate
//!
//! Value types exchanged between the oracle subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary lives here.
//! - **Immutable Events**: an [`Event`] is created when the ledger node delivers a
//!   matching log and is never mutated afterwards.
//! - **Total Order**: `(block_height, log_index)` orders events across all kinds
//!   (see [`LogPosition`]).
//! - **One ABI**: topics, log layouts and calldata all derive from
//!   [`contract::IStakingOracle`].

pub mod contract;
pub mod entities;
pub mod errors;
pub mod report;

pub use alloy_primitives::{Address, Bytes, LogData, B256, U256};
pub use contract::IStakingOracle;
pub use entities::*;
pub use errors::*;
pub use report::*;
