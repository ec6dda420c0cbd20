//! # Oracle Configuration
//!
//! Loaded from `ORACLE_*` environment variables. Every numeric key falls back
//! to its default when unset; a value that does not parse is reported with
//! `warn!` and the default is kept; a zero poll interval or fulfillment
//! timeout counts as unparseable. The contract and transmitter addresses have
//! no default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared_types::{Address, BlockHeight};
use so_01_resilient_transport::RetryPolicy;
use so_02_event_ingestion::IngestionConfig;
use so_03_upkeep_oracle::UpkeepConfig;
use thiserror::Error;
use tracing::warn;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{key} is required")]
    Missing {
        /// Variable name.
        key: &'static str,
    },

    /// An address variable is not a 20-byte hex string.
    #[error("{key} is not a valid address: {value}")]
    InvalidAddress {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// A duration that must be positive was set to zero.
    #[error("{key} must be greater than zero")]
    Zero {
        /// Variable name.
        key: &'static str,
    },
}

/// Complete oracle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// HTTP JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// WebSocket endpoint for log subscriptions.
    pub ws_url: String,
    /// Staking / upkeep contract.
    pub contract: Address,
    /// Node-managed account that sends report transactions.
    pub transmitter: Address,
    /// Time between upkeep checks.
    pub poll_interval: Duration,
    /// Attempts per RPC before giving up.
    pub retry_attempts: u32,
    /// Sleep between attempts.
    pub retry_interval: Duration,
    /// Wait for a matching fulfillment.
    pub fulfillment_timeout: Duration,
    /// Checkpoint file.
    pub checkpoint_path: PathBuf,
    /// Block the contract was deployed in.
    pub deployment_block: BlockHeight,
    /// Resubscriptions per event kind after a disconnect.
    pub max_resubscribe: u32,
}

impl OracleConfig {
    /// Defaults for every optional key, with the given addresses.
    pub fn with_addresses(contract: Address, transmitter: Address) -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            ws_url: "ws://127.0.0.1:8546".to_string(),
            contract,
            transmitter,
            poll_interval: Duration::from_secs(60),
            retry_attempts: 25,
            retry_interval: Duration::from_secs(5),
            fulfillment_timeout: Duration::from_secs(300),
            checkpoint_path: PathBuf::from("./data/checkpoint"),
            deployment_block: 0,
            max_resubscribe: 3,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let address = |key: &'static str| -> Result<Address, ConfigError> {
            let value = lookup(key).ok_or(ConfigError::Missing { key })?;
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress { key, value })
        };
        let mut config = Self::with_addresses(
            address("ORACLE_CONTRACT_ADDRESS")?,
            address("ORACLE_TRANSMITTER_ADDRESS")?,
        );

        if let Some(url) = lookup("ORACLE_RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(url) = lookup("ORACLE_WS_URL") {
            config.ws_url = url;
        }
        if let Some(path) = lookup("ORACLE_CHECKPOINT_PATH") {
            config.checkpoint_path = PathBuf::from(path);
        }

        override_positive_secs(&lookup, "ORACLE_POLL_INTERVAL_SECS", &mut config.poll_interval);
        override_parsed(&lookup, "ORACLE_RETRY_ATTEMPTS", &mut config.retry_attempts);
        override_secs(&lookup, "ORACLE_RETRY_INTERVAL_SECS", &mut config.retry_interval);
        override_positive_secs(
            &lookup,
            "ORACLE_FULFILLMENT_TIMEOUT_SECS",
            &mut config.fulfillment_timeout,
        );
        override_parsed(&lookup, "ORACLE_DEPLOYMENT_BLOCK", &mut config.deployment_block);
        override_parsed(&lookup, "ORACLE_MAX_RESUBSCRIBE", &mut config.max_resubscribe);

        Ok(config)
    }

    /// Reject settings the controller cannot run with.
    ///
    /// Loading never produces them; configs built in code are checked at spawn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero {
                key: "ORACLE_POLL_INTERVAL_SECS",
            });
        }
        if self.fulfillment_timeout.is_zero() {
            return Err(ConfigError::Zero {
                key: "ORACLE_FULFILLMENT_TIMEOUT_SECS",
            });
        }
        Ok(())
    }

    /// Retry policy for every RPC.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_interval)
    }

    /// Ingestion settings.
    pub fn ingestion(&self) -> IngestionConfig {
        IngestionConfig {
            deployment_block: self.deployment_block,
            max_resubscribe: self.max_resubscribe,
            ..IngestionConfig::default()
        }
    }

    /// Controller settings.
    pub fn upkeep(&self) -> UpkeepConfig {
        UpkeepConfig {
            fulfillment_timeout: self.fulfillment_timeout,
            ..UpkeepConfig::default()
        }
    }
}

fn override_parsed<T: FromStr + Copy + std::fmt::Debug>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => {
                let default = *target;
                warn!(key, value = %raw, ?default, "Unparseable setting, keeping default");
            }
        }
    }
}

fn override_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    let mut secs = target.as_secs();
    override_parsed(lookup, key, &mut secs);
    *target = Duration::from_secs(secs);
}

fn override_positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut Duration,
) {
    let default = *target;
    override_secs(lookup, key, target);
    if target.is_zero() {
        warn!(key, value = 0, default_secs = default.as_secs(), "Zero duration, keeping default");
        *target = default;
    }
}
