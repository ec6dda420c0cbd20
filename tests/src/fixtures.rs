//! Shared builders and doubles for the integration flows.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    Address, BlockHeight, Event, EventKind, LogPosition, ReportRequest, ReportResponse, Wei, B256,
    U256,
};
use so_01_resilient_transport::TransportError;
use so_02_event_ingestion::InMemoryLedger;
use so_03_upkeep_oracle::UpkeepContract;

/// Contract address used throughout the suite.
pub const CONTRACT: Address = Address::repeat_byte(0xc0);

/// Block fulfillment logs are emitted from, far above any state event.
const FULFILLMENT_BLOCKS_START: BlockHeight = 1_000_000;

/// `n` wei.
pub fn wei(n: u64) -> Wei {
    U256::from(n)
}

/// State event carrying `amount` wei.
pub fn amount_event(kind: EventKind, block: BlockHeight, log_index: u64, amount: u64) -> Event {
    let mut tx = [0u8; 32];
    tx[..8].copy_from_slice(&block.to_be_bytes());
    tx[8..16].copy_from_slice(&log_index.to_be_bytes());
    let data = kind
        .amount_log(wei(amount))
        .expect("state kinds carry an amount");
    Event::new(
        LogPosition {
            block_height: block,
            log_index,
        },
        B256::from(tx),
        data,
    )
    .expect("amount log has a known topic")
}

/// `ReportFulfilled` log for `response`.
pub fn fulfillment_event(block: BlockHeight, response: &ReportResponse) -> Event {
    Event::new(
        LogPosition {
            block_height: block,
            log_index: 0,
        },
        B256::repeat_byte(0xf0),
        response.to_log_data(),
    )
    .expect("fulfillment log has a known topic")
}

/// Poll `condition` every 10ms until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Upkeep contract whose oracle answers by emitting `ReportFulfilled` logs on
/// an [`InMemoryLedger`], the way the on-chain callback would.
pub struct LedgerBackedContract {
    ledger: Arc<InMemoryLedger>,
    due: AtomicBool,
    oracle_online: AtomicBool,
    next_block: AtomicU64,
    requests: Mutex<Vec<ReportRequest>>,
    submissions: Mutex<Vec<ReportResponse>>,
}

impl LedgerBackedContract {
    /// Not-due contract with a live oracle.
    pub fn new(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            ledger,
            due: AtomicBool::new(false),
            oracle_online: AtomicBool::new(true),
            next_block: AtomicU64::new(FULFILLMENT_BLOCKS_START),
            requests: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Set the `checkUpkeep` answer.
    pub fn set_due(&self, due: bool) {
        self.due.store(due, Ordering::SeqCst);
    }

    /// When offline, requests are accepted but never fulfilled.
    pub fn set_oracle_online(&self, online: bool) {
        self.oracle_online.store(online, Ordering::SeqCst);
    }

    /// Emit a fulfillment log for an arbitrary response.
    pub fn emit_fulfillment(&self, response: &ReportResponse) {
        let block = self.next_block.fetch_add(1, Ordering::SeqCst);
        self.ledger.publish(fulfillment_event(block, response));
    }

    /// Requests issued so far.
    pub fn requests(&self) -> Vec<ReportRequest> {
        self.requests.lock().clone()
    }

    /// Reports submitted so far.
    pub fn submissions(&self) -> Vec<ReportResponse> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl UpkeepContract for LedgerBackedContract {
    fn address(&self) -> Address {
        CONTRACT
    }

    async fn check_upkeep(&self) -> Result<bool, TransportError> {
        Ok(self.due.load(Ordering::SeqCst))
    }

    async fn request_report(&self, request: &ReportRequest) -> Result<B256, TransportError> {
        self.requests.lock().push(*request);
        if self.oracle_online.load(Ordering::SeqCst) {
            self.emit_fulfillment(&ReportResponse {
                request_id: request.request_id,
                values: request.values,
            });
        }
        Ok(B256::repeat_byte(0x01))
    }

    async fn submit_report(&self, response: &ReportResponse) -> Result<B256, TransportError> {
        self.submissions.lock().push(*response);
        Ok(B256::repeat_byte(0x02))
    }
}
