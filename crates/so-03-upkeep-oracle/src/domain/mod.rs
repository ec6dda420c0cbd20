//! # Domain Layer
//!
//! - `errors`: `UpkeepError`, `ForwarderError`
//! - `state`: the report cycle state machine, cycle outcomes and counters

mod errors;
mod state;

pub use errors::{ForwarderError, UpkeepError};
pub use state::{
    CycleOutcome, Transition, UpkeepEvent, UpkeepMachine, UpkeepState, UpkeepStats,
    DEFAULT_HISTORY_CAPACITY,
};
