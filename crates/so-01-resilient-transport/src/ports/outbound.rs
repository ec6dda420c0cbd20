//! # Outbound Ports
//!
//! Generic JSON-RPC access to the ledger node.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::AttemptError;

/// Ledger RPC interface - outbound port.
///
/// One call is one attempt; retrying is the transport's job.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Invoke `method` with positional `params` and return the JSON result.
    async fn call(&self, method: &str, params: Value) -> Result<Value, AttemptError>;
}

#[async_trait]
impl<T: LedgerRpc + ?Sized> LedgerRpc for Arc<T> {
    async fn call(&self, method: &str, params: Value) -> Result<Value, AttemptError> {
        (**self).call(method, params).await
    }
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Scripted ledger RPC for tests.
///
/// Each method answers from its queue of one-shot results first, then from its
/// standing response. Unknown methods fail with `AttemptError::Failure`.
#[derive(Default)]
pub struct MockLedgerRpc {
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, AttemptError>>>>,
    standing: Mutex<HashMap<String, Result<Value, AttemptError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockLedgerRpc {
    /// Empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `result`.
    pub fn respond(&self, method: &str, result: Value) {
        self.standing.lock().insert(method.to_string(), Ok(result));
    }

    /// Always fail `method` with `error`.
    pub fn fail_always(&self, method: &str, error: AttemptError) {
        self.standing.lock().insert(method.to_string(), Err(error));
    }

    /// Fail the next `times` calls of `method`.
    pub fn fail_next(&self, method: &str, times: usize, error: AttemptError) {
        let mut scripted = self.scripted.lock();
        let queue = scripted.entry(method.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(Err(error.clone()));
        }
    }

    /// Answer the next call of `method` with `result`, ahead of the standing response.
    pub fn respond_once(&self, method: &str, result: Value) {
        self.scripted
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(result));
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Number of calls made to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl LedgerRpc for MockLedgerRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, AttemptError> {
        self.calls.lock().push((method.to_string(), params));

        if let Some(next) = self
            .scripted
            .lock()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }

        self.standing
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Err(AttemptError::Failure(format!("no mock response for {method}"))))
    }
}
