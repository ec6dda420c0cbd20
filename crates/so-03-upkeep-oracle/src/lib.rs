//! # SO-03 Upkeep Oracle
//!
//! Periodic report cycle against the on-chain upkeep contract.
//!
//! **Subsystem ID:** 03
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! On every polling tick the [`UpkeepController`] asks the contract whether a
//! report is due. If it is and the folded protocol state has caught up with
//! the chain head, the controller computes the report values from it, issues
//! a [`ReportRequest`](shared_types::ReportRequest) under a fresh request id,
//! waits for the matching oracle fulfillment and submits it. Fulfillments for any other request id are stale and dropped.
//!
//! ```text
//! Idle ──tick──▶ Checking ──not due / not ready──▶ Idle
//!                   │
//!                  due
//!                   ▼
//!          AwaitingFulfillment ──timeout──▶ Idle
//!                   │
//!            matching response
//!                   ▼
//!               Submitting ──ok / failed──▶ Idle
//! ```
//!
//! ## Single Transmitter
//!
//! At most one controller drives a given contract. Construction claims a
//! [`TransmitterLease`] from a shared [`TransmitterRegistry`]; a second claim
//! for the same address fails with [`UpkeepError::TransmitterBusy`].
//!
//! ## Module Structure
//!
//! ```text
//! so-03-upkeep-oracle/
//! ├── domain/          # UpkeepState machine, CycleOutcome, UpkeepError
//! ├── ports/           # UpkeepContract, ProtocolStateSource (+ MockUpkeepContract)
//! ├── adapters/        # RpcUpkeepContract
//! ├── transmitter.rs   # TransmitterRegistry / TransmitterLease
//! ├── fulfillment.rs   # ReportFulfilled events -> controller channel
//! └── controller.rs    # UpkeepController
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod controller;
pub mod domain;
pub mod fulfillment;
pub mod ports;
pub mod transmitter;

pub use adapters::RpcUpkeepContract;
pub use controller::{UpkeepConfig, UpkeepController, MIN_POLL_INTERVAL};
pub use domain::{
    CycleOutcome, ForwarderError, Transition, UpkeepError, UpkeepEvent, UpkeepMachine,
    UpkeepState, UpkeepStats,
};
pub use fulfillment::forward_fulfillments;
pub use ports::{MockUpkeepContract, ProtocolStateSource, UpkeepContract};
pub use transmitter::{TransmitterLease, TransmitterRegistry};
