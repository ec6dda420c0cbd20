//! # Upkeep Controller
//!
//! Drives one report cycle per polling tick. See the crate docs for the state
//! diagram.
//!
//! The fulfillment timeout starts when `request_report` returns. Responses left
//! in the channel from earlier cycles are discarded before a new request is
//! issued, and any response whose id differs from the outstanding one is
//! dropped without a state change.
//!
//! No request is issued while the protocol state is still catching up with
//! the chain head, or once nothing can deliver fulfillments any more.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shared_types::{ReportRequest, ReportResponse, RequestId};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::{
    CycleOutcome, Transition, UpkeepError, UpkeepEvent, UpkeepMachine, UpkeepState, UpkeepStats,
    DEFAULT_HISTORY_CAPACITY,
};
use crate::ports::{ProtocolStateSource, UpkeepContract};
use crate::transmitter::{TransmitterLease, TransmitterRegistry};

/// Default wait for a matching fulfillment.
pub const DEFAULT_FULFILLMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Shortest polling interval `run` accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpkeepConfig {
    /// How long to wait for a matching fulfillment.
    pub fulfillment_timeout: Duration,
    /// Transitions kept for diagnostics.
    pub history_capacity: usize,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            fulfillment_timeout: DEFAULT_FULFILLMENT_TIMEOUT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

enum Step {
    Tick,
    Shutdown,
}

/// Report state machine bound to one contract.
pub struct UpkeepController {
    contract: Arc<dyn UpkeepContract>,
    state_source: Arc<dyn ProtocolStateSource>,
    fulfillments: mpsc::Receiver<ReportResponse>,
    machine: UpkeepMachine,
    config: UpkeepConfig,
    stats: UpkeepStats,
    lease: TransmitterLease,
}

impl UpkeepController {
    /// Claim the transmitter slot for `contract` and build an idle controller.
    ///
    /// Fails with [`UpkeepError::TransmitterBusy`] if another controller in
    /// `registry` already drives the same contract.
    pub fn new(
        registry: &TransmitterRegistry,
        contract: Arc<dyn UpkeepContract>,
        state_source: Arc<dyn ProtocolStateSource>,
        fulfillments: mpsc::Receiver<ReportResponse>,
        config: UpkeepConfig,
    ) -> Result<Self, UpkeepError> {
        let lease = registry.claim(contract.address())?;
        Ok(Self {
            contract,
            state_source,
            fulfillments,
            machine: UpkeepMachine::with_capacity(config.history_capacity),
            config,
            stats: UpkeepStats::default(),
            lease,
        })
    }

    /// Current state.
    pub fn state(&self) -> UpkeepState {
        self.machine.state()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> Vec<Transition> {
        self.machine.history().copied().collect()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> UpkeepStats {
        self.stats
    }

    /// Run one cycle from `Idle` back to `Idle`.
    ///
    /// A failed due check or report request returns the transport error; a
    /// failed submission is an outcome, not an error.
    pub async fn tick(&mut self) -> Result<CycleOutcome, UpkeepError> {
        self.stats.cycles += 1;
        self.machine.process_event(UpkeepEvent::Poll);

        let due = match self.contract.check_upkeep().await {
            Ok(due) => due,
            Err(e) => {
                self.machine.process_event(UpkeepEvent::CheckFailed);
                self.stats.errors += 1;
                error!(
                    contract = %self.lease.contract(),
                    error = %e,
                    "[so-03] Upkeep check failed"
                );
                return Err(e.into());
            }
        };
        if !due {
            self.machine.process_event(UpkeepEvent::NotDue);
            self.stats.not_due += 1;
            debug!("[so-03] No report due");
            return Ok(CycleOutcome::NotDue);
        }

        if !self.state_source.is_ready() {
            self.machine.process_event(UpkeepEvent::NotReady);
            self.stats.not_ready += 1;
            warn!("[so-03] Report due but protocol state is still catching up, skipped");
            return Ok(CycleOutcome::NotReady);
        }

        let request = ReportRequest::new(self.state_source.report_values());
        self.machine.process_event(UpkeepEvent::Due);
        self.discard_pending();
        if self.fulfillments.is_closed() {
            self.machine.process_event(UpkeepEvent::Abandon);
            self.stats.errors += 1;
            error!(
                request_id = %request.request_id,
                "[so-03] Fulfillment channel closed, request not issued"
            );
            return Err(UpkeepError::FulfillmentChannelClosed);
        }

        if let Err(e) = self.contract.request_report(&request).await {
            self.machine.process_event(UpkeepEvent::RequestFailed);
            self.stats.errors += 1;
            error!(request_id = %request.request_id, error = %e, "[so-03] Report request failed");
            return Err(e.into());
        }
        info!(
            request_id = %request.request_id,
            active_stake = %request.values.active_stake,
            swept_rewards = %request.values.swept_rewards,
            swept_exits = %request.values.swept_exits,
            "[so-03] Awaiting fulfillment"
        );

        let response = match self.await_fulfillment(request.request_id).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.machine.process_event(UpkeepEvent::TimedOut);
                self.stats.timed_out += 1;
                warn!(
                    request_id = %request.request_id,
                    timeout_secs = self.config.fulfillment_timeout.as_secs(),
                    "[so-03] Fulfillment timed out, request abandoned"
                );
                return Ok(CycleOutcome::TimedOut {
                    request_id: request.request_id,
                });
            }
            Err(e) => {
                self.machine.process_event(UpkeepEvent::Abandon);
                self.stats.errors += 1;
                error!(request_id = %request.request_id, "[so-03] Fulfillment channel closed");
                return Err(e);
            }
        };

        self.machine.process_event(UpkeepEvent::Fulfilled);
        let outcome = match self.contract.submit_report(&response).await {
            Ok(tx) => {
                self.stats.submitted += 1;
                info!(request_id = %response.request_id, %tx, "[so-03] Report cycle complete");
                CycleOutcome::Submitted {
                    request_id: response.request_id,
                    tx,
                }
            }
            Err(error) => {
                self.stats.submission_failures += 1;
                error!(
                    request_id = %response.request_id,
                    error = %error,
                    "[so-03] Report submission failed"
                );
                CycleOutcome::SubmissionFailed {
                    request_id: response.request_id,
                    error,
                }
            }
        };
        self.machine.process_event(UpkeepEvent::SubmissionDone);
        Ok(outcome)
    }

    /// Tick every `poll_interval` until shutdown is signalled.
    ///
    /// Shutdown abandons an in-flight cycle without waiting for it. The loop
    /// also stops once the fulfillment channel is closed. Intervals below
    /// [`MIN_POLL_INTERVAL`] are raised to it.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> UpkeepStats {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = poll_interval.as_millis() as u64,
                "[so-03] Poll interval too short, using minimum"
            );
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            contract = %self.lease.contract(),
            poll_ms = poll_interval.as_millis() as u64,
            "[so-03] Upkeep controller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let step = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => Step::Shutdown,
                },
                _ = ticker.tick() => Step::Tick,
            };
            if let Step::Shutdown = step {
                break;
            }

            let cycle = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                result = self.tick() => Some(result),
            };
            match cycle {
                None => {
                    self.machine.process_event(UpkeepEvent::Abandon);
                    debug!("[so-03] In-flight cycle abandoned");
                }
                Some(Err(UpkeepError::FulfillmentChannelClosed)) => break,
                Some(_) => {}
            }
        }

        info!(
            cycles = self.stats.cycles,
            submitted = self.stats.submitted,
            timed_out = self.stats.timed_out,
            "[so-03] Upkeep controller stopped"
        );
        self.stats
    }

    // Responses left over from abandoned cycles.
    fn discard_pending(&mut self) {
        while let Ok(stale) = self.fulfillments.try_recv() {
            self.stats.stale_responses += 1;
            debug!(request_id = %stale.request_id, "[so-03] Discarding stale response");
        }
    }

    async fn await_fulfillment(
        &mut self,
        request_id: RequestId,
    ) -> Result<Option<ReportResponse>, UpkeepError> {
        let deadline = Instant::now() + self.config.fulfillment_timeout;
        loop {
            match time::timeout_at(deadline, self.fulfillments.recv()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(UpkeepError::FulfillmentChannelClosed),
                Ok(Some(response)) if response.request_id == request_id => {
                    return Ok(Some(response))
                }
                Ok(Some(stale)) => {
                    self.stats.stale_responses += 1;
                    debug!(
                        expected = %request_id,
                        got = %stale.request_id,
                        "[so-03] Discarding stale response"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for UpkeepController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpkeepController")
            .field("contract", &self.lease.contract())
            .field("state", &self.machine.state())
            .field("stats", &self.stats)
            .finish()
    }
}
