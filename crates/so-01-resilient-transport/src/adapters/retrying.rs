//! Retrying RPC Adapter
//!
//! Pairs any `LedgerRpc` with a `ResilientTransport`. This is the handle the
//! other subsystems hold: every call they make is retried per policy.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{AttemptError, TransportError};
use crate::ports::LedgerRpc;
use crate::transport::ResilientTransport;

/// `LedgerRpc` wrapped in a retry loop.
pub struct RetryingRpc<R> {
    inner: R,
    transport: ResilientTransport,
}

impl<R: LedgerRpc> RetryingRpc<R> {
    /// Wrap `inner`.
    pub fn new(inner: R, transport: ResilientTransport) -> Self {
        Self { inner, transport }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Call `method`, retrying failed attempts.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let inner = &self.inner;
        self.transport
            .execute(method, || {
                let params = params.clone();
                async move { inner.call(method, params).await }
            })
            .await
    }

    /// Call `method` and decode the result into `T`.
    ///
    /// A result that fails to decode counts as a failed attempt.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, TransportError> {
        let inner = &self.inner;
        self.transport
            .execute(method, || {
                let params = params.clone();
                async move {
                    let value = inner.call(method, params).await?;
                    serde_json::from_value(value)
                        .map_err(|e| AttemptError::Failure(format!("decode {method} result: {e}")))
                }
            })
            .await
    }

    /// Run a multi-step attempt against the wrapped client, retrying the whole
    /// attempt when any step fails.
    ///
    /// For operations whose success is judged by more than one call, such as a
    /// broadcast that is confirmed by looking the transaction up.
    pub async fn retry<'a, T, F, Fut>(
        &'a self,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut(&'a R) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>> + 'a,
    {
        let inner = &self.inner;
        self.transport.execute(operation, || attempt(inner)).await
    }
}
