//! # Domain Errors

use shared_types::Address;
use so_01_resilient_transport::TransportError;
use so_02_event_ingestion::{SourceError, SubscribeError};
use thiserror::Error;

/// Errors surfaced by the upkeep controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpkeepError {
    /// A contract read or the report request exhausted its retries.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Another controller already holds the transmitter lease.
    #[error("Transmitter busy: contract {contract} is already driven by another controller")]
    TransmitterBusy {
        /// Contract whose lease is taken.
        contract: Address,
    },

    /// Nothing can deliver fulfillments any more.
    #[error("Fulfillment channel closed")]
    FulfillmentChannelClosed,
}

/// Errors that end the fulfillment forwarder.
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// The `ReportFulfilled` subscription could not be (re)opened.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// The subscription kept dropping and the resubscribe budget is spent.
    #[error("Fulfillment source lost after {resubscriptions} resubscriptions: {source}")]
    SourceLost {
        /// Resubscriptions made before giving up.
        resubscriptions: u32,
        /// Final disconnect.
        #[source]
        source: SourceError,
    },
}
