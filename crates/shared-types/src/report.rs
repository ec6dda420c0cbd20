//! # Report Values
//!
//! Types exchanged with the on-chain upkeep contract and the folded protocol
//! state they are computed from.
//!
//! A [`ReportResponse`] is only ever accepted when its [`RequestId`] matches the
//! request currently outstanding; everything else is stale.

use std::fmt;

use alloy_primitives::{LogData, B256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::IStakingOracle;
use crate::entities::{BlockHeight, Event, EventKind, Wei};
use crate::errors::EventDecodeError;

/// Correlation id of one report request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// `bytes32` form: UUID bytes right-aligned, zero padded.
    pub fn to_word(&self) -> B256 {
        let mut word = B256::ZERO;
        word[16..].copy_from_slice(self.0.as_bytes());
        word
    }

    /// Parse the `bytes32` form. Upper bytes are ignored.
    pub fn from_word(word: &B256) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&word[16..]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

/// The three aggregate values carried by every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportValues {
    /// Stake currently held by active validators.
    pub active_stake: Wei,
    /// Consensus rewards swept to the pool.
    pub swept_rewards: Wei,
    /// Exited validator balances swept to the pool.
    pub swept_exits: Wei,
}

/// Outbound report request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Freshly generated correlation id.
    pub request_id: RequestId,
    /// Values computed from the folded protocol state.
    pub values: ReportValues,
}

impl ReportRequest {
    /// New request with a fresh id.
    pub fn new(values: ReportValues) -> Self {
        Self {
            request_id: RequestId::generate(),
            values,
        }
    }
}

/// Inbound fulfillment delivered by the oracle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Id of the request being answered.
    pub request_id: RequestId,
    /// Values to submit.
    pub values: ReportValues,
}

impl ReportResponse {
    /// Decode a `ReportFulfilled` log.
    pub fn from_event(event: &Event) -> Result<Self, EventDecodeError> {
        if event.kind != EventKind::ReportFulfilled {
            return Err(EventDecodeError::WrongKind {
                expected: EventKind::ReportFulfilled,
                got: event.kind,
            });
        }
        let log = IStakingOracle::ReportFulfilled::decode_log_data(&event.data)?;
        Ok(Self {
            request_id: RequestId::from_word(&log.requestId),
            values: ReportValues {
                active_stake: log.activeStake,
                swept_rewards: log.sweptRewards,
                swept_exits: log.sweptExits,
            },
        })
    }

    /// Log data of the matching `ReportFulfilled` event.
    pub fn to_log_data(&self) -> LogData {
        IStakingOracle::ReportFulfilled {
            requestId: self.request_id.to_word(),
            activeStake: self.values.active_stake,
            sweptRewards: self.values.swept_rewards,
            sweptExits: self.values.swept_exits,
        }
        .encode_log_data()
    }
}

// =============================================================================
// PROTOCOL STATE
// =============================================================================

/// Aggregate protocol state folded from the merged event feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolState {
    /// Stake held by active validators.
    pub active_stake: Wei,
    /// Rewards swept so far.
    pub swept_rewards: Wei,
    /// Exit balances swept so far.
    pub swept_exits: Wei,
    /// Deposited stake not yet activated.
    pub pending_deposits: Wei,
    /// Requested withdrawals.
    pub pending_withdrawals: Wei,
    /// Highest block an applied event came from.
    pub last_block: Option<BlockHeight>,
    /// Number of events folded.
    pub events_applied: u64,
}

impl ProtocolState {
    /// Fold one event into the state.
    ///
    /// `ReportFulfilled` events are not part of the fold and leave the state
    /// untouched.
    pub fn apply(&mut self, event: &Event) -> Result<(), EventDecodeError> {
        match event.kind {
            EventKind::StakeDeposited => {
                self.pending_deposits = self.pending_deposits.saturating_add(event.amount()?);
            }
            EventKind::ValidatorActivated => {
                let amount = event.amount()?;
                self.pending_deposits = self.pending_deposits.saturating_sub(amount);
                self.active_stake = self.active_stake.saturating_add(amount);
            }
            EventKind::RewardsSwept => {
                self.swept_rewards = self.swept_rewards.saturating_add(event.amount()?);
            }
            EventKind::ValidatorExited => {
                let amount = event.amount()?;
                self.active_stake = self.active_stake.saturating_sub(amount);
                self.swept_exits = self.swept_exits.saturating_add(amount);
            }
            EventKind::WithdrawalRequested => {
                self.pending_withdrawals =
                    self.pending_withdrawals.saturating_add(event.amount()?);
            }
            EventKind::ReportFulfilled => return Ok(()),
        }
        self.last_block = Some(
            self.last_block
                .map_or(event.block_height, |b| b.max(event.block_height)),
        );
        self.events_applied += 1;
        Ok(())
    }

    /// Values a report would carry right now.
    pub fn report_values(&self) -> ReportValues {
        ReportValues {
            active_stake: self.active_stake,
            swept_rewards: self.swept_rewards,
            swept_exits: self.swept_exits,
        }
    }
}
