//! # Adapters Layer (Hexagonal Architecture)
//!
//! - `rpc_contract`: upkeep contract over JSON-RPC `eth_call` / `eth_sendTransaction`

mod rpc_contract;

pub use rpc_contract::RpcUpkeepContract;
