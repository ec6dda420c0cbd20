//! # JSON-RPC Upkeep Contract
//!
//! | Operation        | RPC                      | Contract function                                  |
//! |------------------|--------------------------|----------------------------------------------------|
//! | `check_upkeep`   | `eth_call`               | `checkUpkeep()`                                    |
//! | `request_report` | `eth_sendRawTransaction` | `requestReport(bytes32,uint256,uint256,uint256)`   |
//! | `submit_report`  | `eth_sendRawTransaction` | `submitReport(bytes32,uint256,uint256,uint256)`    |
//!
//! ## Idempotent sends
//!
//! A write is built once: the transmitter's pending nonce is read, the node
//! signs the transaction with its managed key, and only the signed bytes are
//! broadcast. A retried broadcast re-sends the same bytes, so it can never
//! land twice. The node answering "already known", or "nonce too low" while
//! the transaction is visible under its hash, means an earlier attempt went
//! through and counts as success.

use std::sync::Arc;

use alloy_primitives::{keccak256, U64};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shared_types::{
    Address, Bytes, IStakingOracle, ReportRequest, ReportResponse, ReportValues, RequestId, B256,
};
use so_01_resilient_transport::{AttemptError, LedgerRpc, RetryingRpc, TransportError};
use tracing::{debug, info};

use crate::ports::UpkeepContract;

/// `eth_signTransaction` result: bare raw bytes, or geth's `{raw, tx}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignedTransaction {
    Raw(Bytes),
    Envelope { raw: Bytes },
}

impl SignedTransaction {
    fn into_raw(self) -> Bytes {
        match self {
            SignedTransaction::Raw(raw) | SignedTransaction::Envelope { raw } => raw,
        }
    }
}

fn already_broadcast(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already known") || message.contains("already imported")
}

fn nonce_consumed(message: &str) -> bool {
    message.to_ascii_lowercase().contains("nonce too low")
}

/// Upkeep contract reached through a retrying JSON-RPC client.
pub struct RpcUpkeepContract<R> {
    rpc: Arc<RetryingRpc<R>>,
    contract: Address,
    transmitter: Address,
}

impl<R: LedgerRpc> RpcUpkeepContract<R> {
    /// Contract at `contract`, writing from `transmitter`.
    pub fn new(rpc: Arc<RetryingRpc<R>>, contract: Address, transmitter: Address) -> Self {
        Self {
            rpc,
            contract,
            transmitter,
        }
    }

    fn request_calldata(request_id: RequestId, values: &ReportValues) -> Bytes {
        IStakingOracle::requestReportCall {
            requestId: request_id.to_word(),
            activeStake: values.active_stake,
            sweptRewards: values.swept_rewards,
            sweptExits: values.swept_exits,
        }
        .abi_encode()
        .into()
    }

    fn submit_calldata(request_id: RequestId, values: &ReportValues) -> Bytes {
        IStakingOracle::submitReportCall {
            requestId: request_id.to_word(),
            activeStake: values.active_stake,
            sweptRewards: values.swept_rewards,
            sweptExits: values.swept_exits,
        }
        .abi_encode()
        .into()
    }

    /// Sign `data` once under a fixed nonce and broadcast it.
    async fn send(&self, data: Bytes) -> Result<B256, TransportError> {
        let nonce: U64 = self
            .rpc
            .call_as(
                "eth_getTransactionCount",
                json!([self.transmitter, "pending"]),
            )
            .await?;
        let tx = json!([{
            "from": self.transmitter,
            "to": self.contract,
            "data": data,
            "nonce": nonce,
        }]);
        let raw = self
            .rpc
            .call_as::<SignedTransaction>("eth_signTransaction", tx)
            .await?
            .into_raw();
        let hash = keccak256(&raw);
        debug!(%hash, %nonce, "[so-03] Transaction signed");

        self.rpc
            .retry("eth_sendRawTransaction", |rpc| {
                let raw = raw.clone();
                async move {
                    match rpc.call("eth_sendRawTransaction", json!([raw])).await {
                        Ok(_) => Ok(hash),
                        Err(AttemptError::Rpc { message, .. }) if already_broadcast(&message) => {
                            debug!(%hash, "[so-03] Transaction already known to node");
                            Ok(hash)
                        }
                        Err(AttemptError::Rpc { code, message }) if nonce_consumed(&message) => {
                            let known = rpc.call("eth_getTransactionByHash", json!([hash])).await?;
                            if known.is_null() {
                                Err(AttemptError::Rpc { code, message })
                            } else {
                                debug!(%hash, "[so-03] Nonce consumed by this transaction");
                                Ok(hash)
                            }
                        }
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl<R: LedgerRpc> UpkeepContract for RpcUpkeepContract<R> {
    fn address(&self) -> Address {
        self.contract
    }

    async fn check_upkeep(&self) -> Result<bool, TransportError> {
        let data: Bytes = IStakingOracle::checkUpkeepCall {}.abi_encode().into();
        let call = json!([{ "to": self.contract, "data": data }, "latest"]);
        let due = self
            .rpc
            .retry("eth_call", |rpc| {
                let call = call.clone();
                async move {
                    let value = rpc.call("eth_call", call).await?;
                    let returned: Bytes = serde_json::from_value(value)
                        .map_err(|e| AttemptError::Failure(format!("decode eth_call result: {e}")))?;
                    IStakingOracle::checkUpkeepCall::abi_decode_returns(&returned)
                        .map_err(|e| AttemptError::Failure(format!("decode checkUpkeep: {e}")))
                }
            })
            .await?;
        debug!(contract = %self.contract, due, "[so-03] checkUpkeep");
        Ok(due)
    }

    async fn request_report(&self, request: &ReportRequest) -> Result<B256, TransportError> {
        let data = Self::request_calldata(request.request_id, &request.values);
        let tx = self.send(data).await?;
        info!(request_id = %request.request_id, %tx, "[so-03] Report requested");
        Ok(tx)
    }

    async fn submit_report(&self, response: &ReportResponse) -> Result<B256, TransportError> {
        let data = Self::submit_calldata(response.request_id, &response.values);
        let tx = self.send(data).await?;
        info!(request_id = %response.request_id, %tx, "[so-03] Report submitted");
        Ok(tx)
    }
}
