//! # Domain Module
//!
//! Error taxonomy, the persisted checkpoint record and the pure bookkeeping
//! behind deduplication and checkpoint advancement.

pub mod checkpoint;
pub mod errors;
pub mod progress;

pub use checkpoint::*;
pub use errors::*;
pub use progress::*;
