//! # Runtime Flows
//!
//! The fully wired oracle (ingestion, forwarder, controller) against an
//! in-process ledger and a file checkpoint, including how the supervisor
//! reacts to a task that stops on its own.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use oracle_runtime::{OracleConfig, OracleRuntime, StopCause};
    use shared_types::{Address, EventKind, ProtocolState, ReportValues};
    use so_02_event_ingestion::{
        Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, InMemoryLedger,
    };
    use so_03_upkeep_oracle::TransmitterRegistry;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tokio::time::sleep;

    use crate::fixtures::{amount_event, wei, LedgerBackedContract, CONTRACT};

    fn config(dir: &TempDir) -> OracleConfig {
        OracleConfig {
            poll_interval: Duration::from_secs(10),
            fulfillment_timeout: Duration::from_secs(5),
            checkpoint_path: dir.path().join("checkpoint"),
            ..OracleConfig::with_addresses(CONTRACT, Address::repeat_byte(0x7e))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_reports_folded_state_and_checkpoints() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.publish(amount_event(EventKind::StakeDeposited, 1, 0, 64));
        ledger.publish(amount_event(EventKind::ValidatorActivated, 2, 0, 32));
        ledger.publish(amount_event(EventKind::RewardsSwept, 3, 0, 5));
        ledger.mine(3);

        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let checkpoint = FileCheckpointStore::open(&config.checkpoint_path).unwrap();
        let runtime =
            OracleRuntime::new(config.clone(), ledger.clone(), contract.clone(), checkpoint);
        let aggregator = runtime.aggregator();

        let (stop, shutdown) = watch::channel(false);
        let tasks = runtime.spawn(shutdown).unwrap();

        // First tick (t=0) finds nothing due; ingestion drains meanwhile.
        sleep(Duration::from_secs(1)).await;
        assert_eq!(aggregator.snapshot().events_applied, 3);
        assert!(aggregator.is_ready());
        contract.set_due(true);

        // Second tick (t=10) reports.
        let report = tasks
            .supervise(&stop, sleep(Duration::from_secs(14)))
            .await
            .unwrap();

        assert_eq!(report.cause, StopCause::Signal);
        assert!(report.is_clean());
        let submissions = contract.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0].values,
            ReportValues {
                active_stake: wei(32),
                swept_rewards: wei(5),
                swept_exits: wei(0),
            }
        );
        assert_eq!(report.upkeep.submitted, 1);
        assert_eq!(report.upkeep.not_due, 1);
        assert_eq!(*report.forwarded.as_ref().unwrap(), 1);

        let summary = report.ingestion.unwrap();
        assert_eq!(summary.events_applied, 3);
        assert_eq!(summary.checkpoint, Some(3));
        assert_eq!(ledger.active_subscriptions(), 0);

        let reopened = FileCheckpointStore::open(&config.checkpoint_path).unwrap();
        let stored = reopened.read().unwrap().unwrap();
        assert_eq!(stored.last_processed_block, 3);
        assert_eq!(stored.state.active_stake, wei(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_report_before_ingestion_catches_up() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.publish(amount_event(EventKind::RewardsSwept, 2, 0, 9));

        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        contract.set_due(true);
        let runtime = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract.clone(),
            InMemoryCheckpointStore::new(),
        );
        let aggregator = runtime.aggregator();
        let (stop, shutdown) = watch::channel(false);
        let tasks = runtime.spawn(shutdown).unwrap();

        // Due from the start, but no kind has reported a watermark.
        sleep(Duration::from_secs(15)).await;
        assert!(!aggregator.is_ready());
        assert!(contract.requests().is_empty());

        ledger.mine(2);
        let report = tasks
            .supervise(&stop, sleep(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(report.upkeep.not_ready, 2);
        assert_eq!(report.upkeep.submitted, 1);
        let submissions = contract.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].values.swept_rewards, wei(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_oracle_for_same_contract_refuses_to_start() {
        let dir = TempDir::new().unwrap();
        let registry = TransmitterRegistry::new();
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let (stop, shutdown) = watch::channel(false);

        let first = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract.clone(),
            InMemoryCheckpointStore::new(),
        )
        .with_registry(registry.clone())
        .spawn(shutdown.clone())
        .unwrap();

        let second = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract,
            InMemoryCheckpointStore::new(),
        )
        .with_registry(registry.clone())
        .spawn(shutdown);
        let err = match second {
            Ok(_) => panic!("second oracle started"),
            Err(e) => e,
        };
        assert!(format!("{err:#}").contains("Transmitter busy"));

        let report = first.supervise(&stop, async {}).await.unwrap();
        assert_eq!(report.cause, StopCause::Signal);
        assert!(!registry.is_claimed(&CONTRACT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_fails_startup() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let config = OracleConfig {
            poll_interval: Duration::ZERO,
            ..config(&dir)
        };
        let (_stop, shutdown) = watch::channel(false);

        let runtime =
            OracleRuntime::new(config, ledger.clone(), contract, InMemoryCheckpointStore::new());
        let err = match runtime.spawn(shutdown) {
            Ok(_) => panic!("oracle started with a zero poll interval"),
            Err(e) => e,
        };
        assert!(format!("{err:#}").contains("ORACLE_POLL_INTERVAL_SECS must be greater than zero"));
        assert_eq!(ledger.subscribe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_continues_the_stored_aggregate() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.publish(amount_event(EventKind::RewardsSwept, 8, 0, 100));
        ledger.publish(amount_event(EventKind::RewardsSwept, 12, 0, 7));
        ledger.mine(12);

        // Block 8 is already part of the stored aggregate.
        let stored = Checkpoint {
            last_processed_block: 10,
            state: ProtocolState {
                swept_rewards: wei(100),
                last_block: Some(8),
                events_applied: 1,
                ..ProtocolState::default()
            },
        };
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let runtime = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract,
            InMemoryCheckpointStore::with_checkpoint(stored),
        );
        let aggregator = runtime.aggregator();
        let (stop, shutdown) = watch::channel(false);
        let tasks = runtime.spawn(shutdown).unwrap();

        let report = tasks
            .supervise(&stop, sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(aggregator.snapshot().swept_rewards, wei(107));
        assert_eq!(aggregator.snapshot().events_applied, 2);
        let summary = report.ingestion.unwrap();
        assert_eq!(summary.resumed_from, 11);
        assert_eq!(summary.events_applied, 1);
        assert_eq!(summary.checkpoint, Some(12));
    }

    // =============================================================================
    // SUPERVISION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_failed_ingestion_stops_every_task() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.reject_kind(EventKind::RewardsSwept);
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let runtime = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract,
            InMemoryCheckpointStore::new(),
        );
        let (stop, shutdown) = watch::channel(false);
        let tasks = runtime.spawn(shutdown).unwrap();

        // Never fires: only the failing task can end the run.
        let report = tasks
            .supervise(&stop, std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.cause, StopCause::IngestionExited);
        assert!(report.ingestion.is_err());
        assert!(report.forwarded.is_ok());
        assert!(!report.is_clean());
        assert!(*stop.borrow());
        assert_eq!(ledger.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingestion_ending_early_is_not_a_clean_stop() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.mine(1);
        let contract = Arc::new(LedgerBackedContract::new(ledger.clone()));
        let runtime = OracleRuntime::new(
            config(&dir),
            ledger.clone(),
            contract,
            InMemoryCheckpointStore::new(),
        );
        let (stop, shutdown) = watch::channel(false);
        let tasks = runtime.spawn(shutdown).unwrap();

        sleep(Duration::from_secs(1)).await;
        for kind in EventKind::STATE {
            ledger.complete_kind(kind);
        }
        let report = tasks
            .supervise(&stop, std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.cause, StopCause::IngestionExited);
        assert!(report.ingestion.is_ok());
        assert!(!report.is_clean());
        assert_eq!(ledger.active_subscriptions(), 0);
    }
}
