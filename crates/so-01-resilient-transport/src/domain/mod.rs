//! # Domain Module
//!
//! Retry policy and the transport error taxonomy.

pub mod errors;
pub mod policy;

pub use errors::*;
pub use policy::*;
