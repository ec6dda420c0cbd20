//! # Upkeep Flows
//!
//! so-03 controller with fulfillments routed from ledger logs through the
//! forwarder, as in production:
//!
//! ```text
//! controller ──request──▶ contract ──ReportFulfilled log──▶ ledger
//!      ▲                                                      │
//!      └──────── mpsc ◀──── forward_fulfillments ◀────────────┘
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shared_types::{ReportResponse, ReportValues};
    use so_02_event_ingestion::InMemoryLedger;
    use so_03_upkeep_oracle::{
        forward_fulfillments, CycleOutcome, TransmitterRegistry, UpkeepConfig, UpkeepController,
        UpkeepError, UpkeepState,
    };
    use tokio::sync::{mpsc, watch};

    use crate::fixtures::{wei, LedgerBackedContract, CONTRACT};

    fn values() -> ReportValues {
        ReportValues {
            active_stake: wei(3_200),
            swept_rewards: wei(12),
            swept_exits: wei(64),
        }
    }

    struct Setup {
        ledger: Arc<InMemoryLedger>,
        contract: Arc<LedgerBackedContract>,
        controller: UpkeepController,
        _stop: watch::Sender<bool>,
    }

    fn setup(registry: &TransmitterRegistry) -> Result<Setup, UpkeepError> {
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let (sink, fulfillments) = mpsc::channel(16);
        let (stop, shutdown) = watch::channel(false);
        tokio::spawn(forward_fulfillments(ledger.clone(), 0, 0, sink, shutdown));

        let controller = UpkeepController::new(
            registry,
            contract.clone(),
            Arc::new(values()),
            fulfillments,
            UpkeepConfig {
                fulfillment_timeout: Duration::from_secs(30),
                ..UpkeepConfig::default()
            },
        )?;
        Ok(Setup {
            ledger,
            contract,
            controller,
            _stop: stop,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fulfillment_log_completes_the_cycle() {
        let mut s = setup(&TransmitterRegistry::new()).unwrap();
        s.contract.set_due(true);

        let outcome = s.controller.tick().await.unwrap();
        let requests = s.contract.requests();
        let submissions = s.contract.submissions();

        assert_eq!(requests.len(), 1);
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].request_id, requests[0].request_id);
        assert_eq!(submissions[0].values, values());
        assert!(matches!(outcome, CycleOutcome::Submitted { .. }));
        assert_eq!(s.controller.state(), UpkeepState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_fulfillment_for_abandoned_request_is_ignored() {
        let mut s = setup(&TransmitterRegistry::new()).unwrap();
        s.contract.set_due(true);
        s.contract.set_oracle_online(false);

        let abandoned = match s.controller.tick().await.unwrap() {
            CycleOutcome::TimedOut { request_id } => request_id,
            other => panic!("expected timeout, got {other:?}"),
        };
        assert!(s.contract.submissions().is_empty());

        // The oracle answers the old request after the controller gave up.
        s.contract.emit_fulfillment(&ReportResponse {
            request_id: abandoned,
            values: ReportValues::default(),
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        s.contract.set_oracle_online(true);
        let outcome = s.controller.tick().await.unwrap();

        let submissions = s.contract.submissions();
        assert_eq!(submissions.len(), 1);
        assert_ne!(submissions[0].request_id, abandoned);
        assert_eq!(submissions[0].values, values());
        assert!(matches!(
            outcome,
            CycleOutcome::Submitted { request_id, .. } if request_id == submissions[0].request_id
        ));
        assert_eq!(s.controller.stats().stale_responses, 1);
        assert_eq!(s.ledger.active_subscriptions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_due_never_requests() {
        let mut s = setup(&TransmitterRegistry::new()).unwrap();

        for _ in 0..3 {
            assert_eq!(s.controller.tick().await.unwrap(), CycleOutcome::NotDue);
        }
        assert!(s.contract.requests().is_empty());
        assert_eq!(s.controller.stats().not_due, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_transmitter_per_contract() {
        let registry = TransmitterRegistry::new();
        let first = setup(&registry).unwrap();

        match setup(&registry) {
            Err(UpkeepError::TransmitterBusy { contract }) => assert_eq!(contract, CONTRACT),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second controller for the same contract was allowed"),
        }

        drop(first);
        assert!(!registry.is_claimed(&CONTRACT));
        assert!(setup(&registry).is_ok());
    }
}
