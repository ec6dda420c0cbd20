//! # Core Ledger Entities
//!
//! Event kinds, log positions and the immutable [`Event`] record delivered by
//! the ledger node.

use std::fmt;

use alloy_primitives::{Address, LogData, B256, U256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::contract::IStakingOracle as C;
use crate::errors::EventDecodeError;

/// Ledger block height.
pub type BlockHeight = u64;

/// Amount in the ledger's base unit.
pub type Wei = U256;

// =============================================================================
// EVENT KINDS
// =============================================================================

/// Categories of events emitted by the staking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// User stake entered the pool.
    StakeDeposited,
    /// A validator started earning with the given stake.
    ValidatorActivated,
    /// Consensus rewards were swept to the pool.
    RewardsSwept,
    /// A validator exited and its balance was swept.
    ValidatorExited,
    /// A user asked to withdraw stake.
    WithdrawalRequested,
    /// The upkeep contract delivered a report fulfillment.
    ReportFulfilled,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::StakeDeposited,
        EventKind::ValidatorActivated,
        EventKind::RewardsSwept,
        EventKind::ValidatorExited,
        EventKind::WithdrawalRequested,
        EventKind::ReportFulfilled,
    ];

    /// Kinds that feed the protocol-state fold.
    pub const STATE: [EventKind; 5] = [
        EventKind::StakeDeposited,
        EventKind::ValidatorActivated,
        EventKind::RewardsSwept,
        EventKind::ValidatorExited,
        EventKind::WithdrawalRequested,
    ];

    /// Canonical Solidity event signature.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::StakeDeposited => C::StakeDeposited::SIGNATURE,
            EventKind::ValidatorActivated => C::ValidatorActivated::SIGNATURE,
            EventKind::RewardsSwept => C::RewardsSwept::SIGNATURE,
            EventKind::ValidatorExited => C::ValidatorExited::SIGNATURE,
            EventKind::WithdrawalRequested => C::WithdrawalRequested::SIGNATURE,
            EventKind::ReportFulfilled => C::ReportFulfilled::SIGNATURE,
        }
    }

    /// Topic-0 of logs of this kind.
    pub fn topic(&self) -> B256 {
        match self {
            EventKind::StakeDeposited => C::StakeDeposited::SIGNATURE_HASH,
            EventKind::ValidatorActivated => C::ValidatorActivated::SIGNATURE_HASH,
            EventKind::RewardsSwept => C::RewardsSwept::SIGNATURE_HASH,
            EventKind::ValidatorExited => C::ValidatorExited::SIGNATURE_HASH,
            EventKind::WithdrawalRequested => C::WithdrawalRequested::SIGNATURE_HASH,
            EventKind::ReportFulfilled => C::ReportFulfilled::SIGNATURE_HASH,
        }
    }

    /// Resolve a topic-0 back to its kind.
    pub fn from_topic(topic: &B256) -> Result<Self, EventDecodeError> {
        Self::ALL
            .into_iter()
            .find(|k| k.topic() == *topic)
            .ok_or(EventDecodeError::UnknownTopic(*topic))
    }

    /// Log data of a state event carrying `amount`, indexed fields zeroed.
    ///
    /// `None` for `ReportFulfilled`, which carries no single amount.
    pub fn amount_log(&self, amount: Wei) -> Option<LogData> {
        let data = match self {
            EventKind::StakeDeposited => C::StakeDeposited {
                staker: Address::ZERO,
                amount,
            }
            .encode_log_data(),
            EventKind::ValidatorActivated => C::ValidatorActivated {
                validatorId: U256::ZERO,
                amount,
            }
            .encode_log_data(),
            EventKind::RewardsSwept => C::RewardsSwept { amount }.encode_log_data(),
            EventKind::ValidatorExited => C::ValidatorExited {
                validatorId: U256::ZERO,
                amount,
            }
            .encode_log_data(),
            EventKind::WithdrawalRequested => C::WithdrawalRequested {
                staker: Address::ZERO,
                amount,
            }
            .encode_log_data(),
            EventKind::ReportFulfilled => return None,
        };
        Some(data)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Position of a log in the ledger. Orders events across all kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct LogPosition {
    /// Block containing the log.
    pub block_height: BlockHeight,
    /// Index of the log within the block.
    pub log_index: u64,
}

/// An immutable contract event delivered by the ledger node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event category.
    pub kind: EventKind,
    /// Block the log was emitted in.
    pub block_height: BlockHeight,
    /// Transaction that emitted the log.
    pub transaction_hash: B256,
    /// Index of the log within its block.
    pub log_index: u64,
    /// Topics and ABI-encoded data of the log.
    pub data: LogData,
}

impl Event {
    /// Build an event, resolving its kind from topic-0.
    pub fn new(
        position: LogPosition,
        transaction_hash: B256,
        data: LogData,
    ) -> Result<Self, EventDecodeError> {
        let topic = data.topics().first().ok_or(EventDecodeError::MissingTopic)?;
        Ok(Self {
            kind: EventKind::from_topic(topic)?,
            block_height: position.block_height,
            transaction_hash,
            log_index: position.log_index,
            data,
        })
    }

    /// Total-order key for this event.
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_height: self.block_height,
            log_index: self.log_index,
        }
    }

    /// The amount carried by a state event.
    pub fn amount(&self) -> Result<Wei, EventDecodeError> {
        let amount = match self.kind {
            EventKind::StakeDeposited => C::StakeDeposited::decode_log_data(&self.data)?.amount,
            EventKind::ValidatorActivated => {
                C::ValidatorActivated::decode_log_data(&self.data)?.amount
            }
            EventKind::RewardsSwept => C::RewardsSwept::decode_log_data(&self.data)?.amount,
            EventKind::ValidatorExited => C::ValidatorExited::decode_log_data(&self.data)?.amount,
            EventKind::WithdrawalRequested => {
                C::WithdrawalRequested::decode_log_data(&self.data)?.amount
            }
            EventKind::ReportFulfilled => return Err(EventDecodeError::NoAmount(self.kind)),
        };
        Ok(amount)
    }
}
