//! # Adapters Layer (Hexagonal Architecture)
//!
//! - `file_checkpoint`: durable checkpoint file with single-writer lock
//! - `memory`: in-process ledger and checkpoint doubles
//! - `ws_subscriber`: WebSocket `eth_subscribe` (logs + newHeads) plus `eth_getLogs` backfill

mod file_checkpoint;
mod memory;
mod ws_subscriber;

pub use file_checkpoint::{CheckpointLock, FileCheckpointStore};
pub use memory::{InMemoryCheckpointStore, InMemoryLedger};
pub use ws_subscriber::{log_to_event, WsLedgerSubscriber};
