//! # Transmitter Registry
//!
//! Hands out at most one [`TransmitterLease`] per contract address. The
//! registry is an explicit context object: controllers that must exclude each
//! other share a clone of the same registry.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::Address;
use tracing::debug;

use crate::domain::UpkeepError;

/// Shared set of contracts that already have a transmitter.
#[derive(Debug, Clone, Default)]
pub struct TransmitterRegistry {
    claimed: Arc<Mutex<HashSet<Address>>>,
}

impl TransmitterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the transmitter slot for `contract`.
    pub fn claim(&self, contract: Address) -> Result<TransmitterLease, UpkeepError> {
        if !self.claimed.lock().insert(contract) {
            return Err(UpkeepError::TransmitterBusy { contract });
        }
        debug!(%contract, "[so-03] Transmitter lease claimed");
        Ok(TransmitterLease {
            contract,
            registry: self.clone(),
        })
    }

    /// Whether `contract` currently has a transmitter.
    pub fn is_claimed(&self, contract: &Address) -> bool {
        self.claimed.lock().contains(contract)
    }
}

/// Exclusive right to drive one contract; released on drop.
#[derive(Debug)]
pub struct TransmitterLease {
    contract: Address,
    registry: TransmitterRegistry,
}

impl TransmitterLease {
    /// Leased contract.
    pub fn contract(&self) -> Address {
        self.contract
    }
}

impl Drop for TransmitterLease {
    fn drop(&mut self) {
        self.registry.claimed.lock().remove(&self.contract);
        debug!(contract = %self.contract, "[so-03] Transmitter lease released");
    }
}
