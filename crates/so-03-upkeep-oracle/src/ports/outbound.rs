//! # Outbound Ports
//!
//! The upkeep contract as the controller sees it, and the state a report is
//! computed from.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Address, ReportRequest, ReportResponse, ReportValues, B256};
use so_01_resilient_transport::TransportError;
use so_02_event_ingestion::ProtocolAggregator;
use tokio::sync::mpsc;

/// On-chain upkeep contract - outbound port.
///
/// Every call is already retried by the resilient transport; an error means
/// the retry budget is spent.
#[async_trait]
pub trait UpkeepContract: Send + Sync {
    /// Contract address (the transmitter lease key).
    fn address(&self) -> Address;

    /// Whether a report is due now.
    async fn check_upkeep(&self) -> Result<bool, TransportError>;

    /// Ask the oracle for a report; returns the transaction hash.
    async fn request_report(&self, request: &ReportRequest) -> Result<B256, TransportError>;

    /// Submit fulfilled values; returns the transaction hash.
    async fn submit_report(&self, response: &ReportResponse) -> Result<B256, TransportError>;
}

#[async_trait]
impl<T: UpkeepContract + ?Sized> UpkeepContract for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn check_upkeep(&self) -> Result<bool, TransportError> {
        (**self).check_upkeep().await
    }

    async fn request_report(&self, request: &ReportRequest) -> Result<B256, TransportError> {
        (**self).request_report(request).await
    }

    async fn submit_report(&self, response: &ReportResponse) -> Result<B256, TransportError> {
        (**self).submit_report(response).await
    }
}

/// Source of the values a report carries.
pub trait ProtocolStateSource: Send + Sync {
    /// Values computed from the current folded state.
    fn report_values(&self) -> ReportValues;

    /// Whether the state has caught up with the chain head. Values from a
    /// source that is not ready must not be reported.
    fn is_ready(&self) -> bool;
}

impl ProtocolStateSource for ProtocolAggregator {
    fn report_values(&self) -> ReportValues {
        ProtocolAggregator::report_values(self)
    }

    fn is_ready(&self) -> bool {
        ProtocolAggregator::is_ready(self)
    }
}

/// Fixed values, always ready.
impl ProtocolStateSource for ReportValues {
    fn report_values(&self) -> ReportValues {
        *self
    }

    fn is_ready(&self) -> bool {
        true
    }
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

#[derive(Default)]
struct MockInner {
    due: bool,
    check_error: Option<TransportError>,
    request_error: Option<TransportError>,
    submit_error: Option<TransportError>,
    checks: usize,
    requests: Vec<ReportRequest>,
    submissions: Vec<ReportResponse>,
    fulfiller: Option<mpsc::Sender<ReportResponse>>,
    stale_before_match: Vec<ReportResponse>,
    transactions: u64,
}

/// Scripted upkeep contract for tests.
///
/// With a fulfiller attached, every `request_report` immediately answers
/// through the channel, echoing the request id and values.
pub struct MockUpkeepContract {
    address: Address,
    inner: Mutex<MockInner>,
}

impl MockUpkeepContract {
    /// Not-due contract at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            inner: Mutex::new(MockInner::default()),
        }
    }

    /// Set the `check_upkeep` answer.
    pub fn set_due(&self, due: bool) {
        self.inner.lock().due = due;
    }

    /// Fail every `check_upkeep` with `error` (`None` clears it).
    pub fn fail_check(&self, error: Option<TransportError>) {
        self.inner.lock().check_error = error;
    }

    /// Fail every `request_report` with `error` (`None` clears it).
    pub fn fail_request(&self, error: Option<TransportError>) {
        self.inner.lock().request_error = error;
    }

    /// Fail every `submit_report` with `error` (`None` clears it).
    pub fn fail_submit(&self, error: Option<TransportError>) {
        self.inner.lock().submit_error = error;
    }

    /// Answer each request through `sender`.
    pub fn fulfill_with(&self, sender: mpsc::Sender<ReportResponse>) {
        self.inner.lock().fulfiller = Some(sender);
    }

    /// Send `responses` ahead of the matching fulfillment on the next request.
    pub fn precede_fulfillment_with(&self, responses: Vec<ReportResponse>) {
        self.inner.lock().stale_before_match = responses;
    }

    /// `check_upkeep` calls so far.
    pub fn checks(&self) -> usize {
        self.inner.lock().checks
    }

    /// Requests issued, in order.
    pub fn requests(&self) -> Vec<ReportRequest> {
        self.inner.lock().requests.clone()
    }

    /// Reports submitted, in order.
    pub fn submissions(&self) -> Vec<ReportResponse> {
        self.inner.lock().submissions.clone()
    }

    fn next_transaction(inner: &mut MockInner) -> B256 {
        inner.transactions += 1;
        B256::left_padding_from(&inner.transactions.to_be_bytes())
    }
}

#[async_trait]
impl UpkeepContract for MockUpkeepContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn check_upkeep(&self) -> Result<bool, TransportError> {
        let mut inner = self.inner.lock();
        inner.checks += 1;
        match &inner.check_error {
            Some(err) => Err(err.clone()),
            None => Ok(inner.due),
        }
    }

    async fn request_report(&self, request: &ReportRequest) -> Result<B256, TransportError> {
        let mut inner = self.inner.lock();
        if let Some(err) = &inner.request_error {
            return Err(err.clone());
        }
        inner.requests.push(*request);

        if let Some(sender) = inner.fulfiller.clone() {
            for stale in std::mem::take(&mut inner.stale_before_match) {
                let _ = sender.try_send(stale);
            }
            let _ = sender.try_send(ReportResponse {
                request_id: request.request_id,
                values: request.values,
            });
        }
        Ok(Self::next_transaction(&mut inner))
    }

    async fn submit_report(&self, response: &ReportResponse) -> Result<B256, TransportError> {
        let mut inner = self.inner.lock();
        if let Some(err) = &inner.submit_error {
            return Err(err.clone());
        }
        inner.submissions.push(*response);
        Ok(Self::next_transaction(&mut inner))
    }
}
