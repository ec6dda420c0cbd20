//! # Fulfillment Forwarder
//!
//! Feeds the controller's fulfillment channel from a dedicated
//! `ReportFulfilled` event source. Undecodable logs are skipped. A dropped
//! subscription is reopened from the highest block seen, up to a budget;
//! replayed fulfillments are harmless since the controller drops any id it is
//! not waiting for.

use std::sync::Arc;

use shared_types::{BlockHeight, EventKind, ReportResponse};
use so_02_event_ingestion::{EventSource, LedgerSubscriber};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::ForwarderError;

/// Forward decoded fulfillments into `sink` until shutdown, source completion
/// or the receiving controller going away. Returns the number forwarded.
pub async fn forward_fulfillments(
    subscriber: Arc<dyn LedgerSubscriber>,
    since_block: BlockHeight,
    max_resubscribe: u32,
    sink: mpsc::Sender<ReportResponse>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64, ForwarderError> {
    let kind = EventKind::ReportFulfilled;
    let mut source = EventSource::open(subscriber.clone(), kind, since_block).await?;
    let mut resume = since_block;
    let mut resubscriptions = 0;
    let mut forwarded = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = tokio::select! {
            biased;
            changed = shutdown.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break,
            },
            next = source.next() => next,
        };

        match next {
            Ok(Some(event)) => {
                resume = resume.max(event.block_height);
                match ReportResponse::from_event(&event) {
                    Ok(response) => {
                        if sink.send(response).await.is_err() {
                            debug!("[so-03] Controller gone, forwarder stopping");
                            break;
                        }
                        forwarded += 1;
                    }
                    Err(e) => warn!(
                        block = event.block_height,
                        tx = %event.transaction_hash,
                        error = %e,
                        "[so-03] Undecodable fulfillment log skipped"
                    ),
                }
            }
            Ok(None) => {
                info!("[so-03] Fulfillment source completed");
                break;
            }
            Err(e) => {
                if resubscriptions >= max_resubscribe {
                    return Err(ForwarderError::SourceLost {
                        resubscriptions,
                        source: e,
                    });
                }
                resubscriptions += 1;
                warn!(
                    error = %e,
                    since = resume,
                    attempt = resubscriptions,
                    "[so-03] Fulfillment source dropped, resubscribing"
                );
                source = EventSource::open(subscriber.clone(), kind, resume).await?;
            }
        }
    }

    Ok(forwarded)
}
