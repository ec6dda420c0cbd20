//! # Adapters Layer (Hexagonal Architecture)
//!
//! Concrete `LedgerRpc` implementations.

mod http_rpc;
mod retrying;

pub use http_rpc::HttpJsonRpc;
pub use retrying::RetryingRpc;
