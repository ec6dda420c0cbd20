//! HTTP JSON-RPC Adapter
//!
//! Implements the `LedgerRpc` port over JSON-RPC 2.0 with `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::domain::{AttemptError, ClientBuildError};
use crate::ports::LedgerRpc;

/// Longest response body kept in a `Status` error.
const MAX_ERROR_BODY: usize = 512;

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// A `null` result is a valid answer (e.g. an unknown transaction hash).
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client for the ledger node's HTTP endpoint.
pub struct HttpJsonRpc {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl HttpJsonRpc {
    /// Create a client with a per-request timeout.
    pub fn new(
        rpc_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        let rpc_url = rpc_url.into();
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| ClientBuildError {
                url: rpc_url.clone(),
                source,
            })?;

        Ok(Self {
            http_client,
            rpc_url,
            request_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl LedgerRpc for HttpJsonRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, AttemptError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!(method, id, "[so-01] JSON-RPC request");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Failure(format!("send {method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                code: status.as_u16(),
                body: clip_body(body),
            });
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Failure(format!("decode {method} response: {e}")))?;

        if let Some(error) = rpc_response.error {
            return Err(AttemptError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result)
    }
}

/// Cut `body` to at most `MAX_ERROR_BODY` bytes on a char boundary.
fn clip_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
