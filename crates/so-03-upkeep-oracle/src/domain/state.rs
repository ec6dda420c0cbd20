//! # Report Cycle State Machine
//!
//! ```text
//! [Idle] ──Poll──▶ [Checking] ──NotDue / NotReady / CheckFailed──▶ [Idle]
//!                      │
//!                     Due
//!                      ▼
//!            [AwaitingFulfillment] ──RequestFailed / TimedOut──▶ [Idle]
//!                      │
//!                  Fulfilled
//!                      ▼
//!                [Submitting] ──SubmissionDone──▶ [Idle]
//!
//! any state ──Abandon──▶ [Idle]
//! ```
//!
//! Transitions are a pure function of `(state, event)`. An event that does not
//! apply to the current state leaves it unchanged and is not recorded.

use std::collections::VecDeque;
use std::fmt;

use shared_types::{RequestId, B256};
use so_01_resilient_transport::TransportError;

/// Transitions kept by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Where the controller is in the report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpkeepState {
    /// Waiting for the next polling tick.
    #[default]
    Idle,
    /// Asking the contract whether a report is due.
    Checking,
    /// Request issued; waiting for the matching fulfillment.
    AwaitingFulfillment,
    /// Sending the fulfilled values to the contract.
    Submitting,
}

impl fmt::Display for UpkeepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpkeepState::Idle => "idle",
            UpkeepState::Checking => "checking",
            UpkeepState::AwaitingFulfillment => "awaiting-fulfillment",
            UpkeepState::Submitting => "submitting",
        };
        f.write_str(name)
    }
}

/// Inputs that drive [`UpkeepState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpkeepEvent {
    /// Polling tick.
    Poll,
    /// Contract says no report is due.
    NotDue,
    /// Contract says a report is due.
    Due,
    /// A report is due but the folded state has not caught up yet.
    NotReady,
    /// The due check exhausted its retries.
    CheckFailed,
    /// Issuing the request exhausted its retries.
    RequestFailed,
    /// A response with the outstanding request id arrived.
    Fulfilled,
    /// No matching response within the timeout.
    TimedOut,
    /// Submission finished, successfully or not.
    SubmissionDone,
    /// Cycle cancelled (shutdown).
    Abandon,
}

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before.
    pub from: UpkeepState,
    /// State after.
    pub to: UpkeepState,
    /// Event that caused it.
    pub event: UpkeepEvent,
}

/// Owned report-cycle state plus a bounded transition history.
#[derive(Debug)]
pub struct UpkeepMachine {
    state: UpkeepState,
    history: VecDeque<Transition>,
    capacity: usize,
}

impl Default for UpkeepMachine {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl UpkeepMachine {
    /// Idle machine keeping the last `capacity` transitions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: UpkeepState::Idle,
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Current state.
    pub fn state(&self) -> UpkeepState {
        self.state
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    /// Apply `event`; returns the resulting state.
    pub fn process_event(&mut self, event: UpkeepEvent) -> UpkeepState {
        if let Some(to) = Self::next_state(self.state, event) {
            if self.capacity > 0 {
                if self.history.len() == self.capacity {
                    self.history.pop_front();
                }
                self.history.push_back(Transition {
                    from: self.state,
                    to,
                    event,
                });
            }
            self.state = to;
        }
        self.state
    }

    fn next_state(state: UpkeepState, event: UpkeepEvent) -> Option<UpkeepState> {
        use UpkeepEvent as E;
        use UpkeepState as S;

        match (state, event) {
            (S::Idle, E::Abandon) => None,
            (_, E::Abandon) => Some(S::Idle),

            (S::Idle, E::Poll) => Some(S::Checking),

            (S::Checking, E::NotDue | E::NotReady | E::CheckFailed) => Some(S::Idle),
            (S::Checking, E::Due) => Some(S::AwaitingFulfillment),

            (S::AwaitingFulfillment, E::RequestFailed | E::TimedOut) => Some(S::Idle),
            (S::AwaitingFulfillment, E::Fulfilled) => Some(S::Submitting),

            (S::Submitting, E::SubmissionDone) => Some(S::Idle),

            _ => None,
        }
    }
}

/// Result of one report cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Contract reported nothing to do.
    NotDue,
    /// A report was due but the protocol state is still catching up.
    NotReady,
    /// Fulfillment received and submitted.
    Submitted {
        /// Request that was fulfilled.
        request_id: RequestId,
        /// Submission transaction.
        tx: B256,
    },
    /// No matching fulfillment before the timeout; request abandoned.
    TimedOut {
        /// Abandoned request.
        request_id: RequestId,
    },
    /// Fulfillment received but submission exhausted its retries.
    SubmissionFailed {
        /// Request that was fulfilled.
        request_id: RequestId,
        /// Last transport failure.
        error: TransportError,
    },
}

/// Counters over the controller's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpkeepStats {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles where no report was due.
    pub not_due: u64,
    /// Due cycles skipped because the state was not caught up.
    pub not_ready: u64,
    /// Reports submitted.
    pub submitted: u64,
    /// Requests abandoned after the timeout.
    pub timed_out: u64,
    /// Submissions that exhausted their retries.
    pub submission_failures: u64,
    /// Cycles aborted by a check or request failure.
    pub errors: u64,
    /// Responses discarded for carrying another request id.
    pub stale_responses: u64,
}
