//! # Ingestion Flows
//!
//! The so-02 pipeline against an in-process ledger:
//!
//! 1. Every event of every watched kind reaches the fold exactly once
//! 2. A restart continues the stored fold from the file checkpoint
//! 3. A crash while one kind lags loses nothing: the checkpoint never passed it
//! 4. A kind lost beyond its resubscribe budget freezes the checkpoint, others
//!    keep delivering

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use shared_types::EventKind;
    use so_02_event_ingestion::{
        CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, InMemoryLedger,
        IngestionConfig, IngestionError, IngestionPipeline, IngestionSummary, ProtocolAggregator,
    };
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    use crate::fixtures::{amount_event, eventually, wei};

    fn complete_all(ledger: &InMemoryLedger) {
        for kind in EventKind::STATE {
            ledger.complete_kind(kind);
        }
    }

    fn spawn_on_file(
        ledger: &Arc<InMemoryLedger>,
        path: &Path,
        aggregator: &ProtocolAggregator,
        config: IngestionConfig,
    ) -> (
        JoinHandle<Result<IngestionSummary, IngestionError>>,
        watch::Sender<bool>,
    ) {
        let (stop, shutdown) = watch::channel(false);
        let pipeline = IngestionPipeline::new(
            ledger.clone(),
            FileCheckpointStore::open(path).unwrap(),
            aggregator.clone(),
            config,
        );
        (tokio::spawn(pipeline.run(shutdown)), stop)
    }

    // =============================================================================
    // MERGE COMPLETENESS
    // =============================================================================

    #[tokio::test]
    async fn test_every_event_is_folded_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let aggregator = ProtocolAggregator::new();
        let checkpoint = InMemoryCheckpointStore::new();
        let (_stop, shutdown) = watch::channel(false);

        let pipeline = IngestionPipeline::new(
            ledger.clone(),
            checkpoint.clone(),
            aggregator.clone(),
            IngestionConfig::default(),
        );
        let run = tokio::spawn(pipeline.run(shutdown));
        eventually(|| ledger.active_subscriptions() == EventKind::STATE.len()).await;

        // Published out of ledger order; the fold still runs in log order.
        ledger.publish(amount_event(EventKind::ValidatorExited, 4, 0, 32));
        ledger.publish(amount_event(EventKind::ValidatorActivated, 2, 0, 32));
        ledger.publish(amount_event(EventKind::ValidatorActivated, 2, 1, 32));
        ledger.publish(amount_event(EventKind::StakeDeposited, 1, 0, 64));
        ledger.publish(amount_event(EventKind::RewardsSwept, 3, 0, 5));
        ledger.publish(amount_event(EventKind::WithdrawalRequested, 5, 0, 10));
        ledger.publish(amount_event(EventKind::RewardsSwept, 5, 1, 2));
        assert_eq!(aggregator.snapshot().events_applied, 0);

        ledger.mine(5);
        eventually(|| aggregator.snapshot().events_applied == 7).await;
        assert!(aggregator.is_ready());

        complete_all(&ledger);
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.events_applied, 7);
        assert_eq!(summary.duplicates_skipped, 0);
        assert_eq!(summary.unsettled, 0);
        assert_eq!(summary.checkpoint, Some(5));
        assert_eq!(checkpoint.writes(), vec![5]);

        let state = aggregator.snapshot();
        assert_eq!(state.pending_deposits, wei(0));
        assert_eq!(state.active_stake, wei(32));
        assert_eq!(state.swept_rewards, wei(7));
        assert_eq!(state.swept_exits, wei(32));
        assert_eq!(state.pending_withdrawals, wei(10));
        assert_eq!(ledger.active_subscriptions(), 0);
    }

    // =============================================================================
    // RESTART
    // =============================================================================

    #[tokio::test]
    async fn test_restart_continues_the_stored_fold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint");
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.publish(amount_event(EventKind::StakeDeposited, 1, 0, 64));
        ledger.publish(amount_event(EventKind::RewardsSwept, 3, 0, 5));
        ledger.publish(amount_event(EventKind::WithdrawalRequested, 5, 0, 10));
        ledger.publish(amount_event(EventKind::RewardsSwept, 5, 1, 2));
        ledger.mine(5);

        // First run: replays everything from the deployment block.
        let first = {
            let aggregator = ProtocolAggregator::new();
            let (run, _stop) =
                spawn_on_file(&ledger, &path, &aggregator, IngestionConfig::default());
            eventually(|| aggregator.snapshot().events_applied == 4).await;
            complete_all(&ledger);
            run.await.unwrap().unwrap()
        };
        assert_eq!(first.resumed_from, 0);
        assert_eq!(first.checkpoint, Some(5));

        // Second run: resumes at block 6 on top of the stored aggregate.
        let aggregator = ProtocolAggregator::new();
        let (run, _stop) = spawn_on_file(&ledger, &path, &aggregator, IngestionConfig::default());
        eventually(|| aggregator.is_ready()).await;
        assert_eq!(aggregator.snapshot().swept_rewards, wei(7));

        ledger.publish(amount_event(EventKind::ValidatorActivated, 6, 0, 32));
        ledger.mine(6);
        eventually(|| aggregator.snapshot().events_applied == 5).await;
        complete_all(&ledger);
        let second = run.await.unwrap().unwrap();

        assert_eq!(second.resumed_from, 6);
        assert_eq!(second.events_applied, 1);
        assert_eq!(second.duplicates_skipped, 0);
        assert_eq!(second.checkpoint, Some(6));
        let state = aggregator.snapshot();
        assert_eq!(state.swept_rewards, wei(7));
        assert_eq!(state.pending_withdrawals, wei(10));
        assert_eq!(state.pending_deposits, wei(32));
        assert_eq!(state.active_stake, wei(32));
    }

    #[tokio::test]
    async fn test_crash_while_a_kind_lags_replays_its_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint");
        let ledger = Arc::new(InMemoryLedger::new());
        let config = IngestionConfig {
            kinds: vec![EventKind::StakeDeposited, EventKind::RewardsSwept],
            ..IngestionConfig::default()
        };

        let aggregator = ProtocolAggregator::new();
        let (run, _stop) = spawn_on_file(&ledger, &path, &aggregator, config.clone());
        eventually(|| ledger.active_subscriptions() == 2).await;

        ledger.publish(amount_event(EventKind::StakeDeposited, 2, 0, 10));
        ledger.publish(amount_event(EventKind::RewardsSwept, 4, 0, 5));
        ledger.publish(amount_event(EventKind::StakeDeposited, 6, 0, 20));
        ledger.sync_kind(EventKind::StakeDeposited, 6);
        ledger.sync_kind(EventKind::RewardsSwept, 2);
        eventually(|| aggregator.snapshot().events_applied == 1).await;

        // The process dies with blocks 3..=6 admitted but not yet safe.
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        {
            let store = FileCheckpointStore::open(&path).unwrap();
            let stored = store.read().unwrap().unwrap();
            assert_eq!(stored.last_processed_block, 2);
            assert_eq!(stored.state.pending_deposits, wei(10));
            assert_eq!(stored.state.swept_rewards, wei(0));
        }

        let aggregator = ProtocolAggregator::new();
        let (run, _stop) = spawn_on_file(&ledger, &path, &aggregator, config);
        eventually(|| ledger.subscribe_calls() == 4).await;
        ledger.mine(6);
        eventually(|| aggregator.snapshot().events_applied == 3).await;
        ledger.complete_kind(EventKind::StakeDeposited);
        ledger.complete_kind(EventKind::RewardsSwept);
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.resumed_from, 3);
        assert_eq!(summary.events_applied, 2);
        assert_eq!(summary.checkpoint, Some(6));
        let state = aggregator.snapshot();
        assert_eq!(state.pending_deposits, wei(30));
        assert_eq!(state.swept_rewards, wei(5));
    }

    // =============================================================================
    // DEGRADATION
    // =============================================================================

    #[tokio::test]
    async fn test_lost_kind_freezes_checkpoint_but_others_continue() {
        let ledger = Arc::new(InMemoryLedger::new());
        let aggregator = ProtocolAggregator::new();
        let checkpoint = InMemoryCheckpointStore::new();
        let (_stop, shutdown) = watch::channel(false);
        let pipeline = IngestionPipeline::new(
            ledger.clone(),
            checkpoint.clone(),
            aggregator.clone(),
            IngestionConfig {
                max_resubscribe: 0,
                ..IngestionConfig::default()
            },
        );
        let run = tokio::spawn(pipeline.run(shutdown));
        eventually(|| ledger.active_subscriptions() == EventKind::STATE.len()).await;

        ledger.publish(amount_event(EventKind::RewardsSwept, 6, 0, 4));
        ledger.mine(6);
        eventually(|| checkpoint.block() == Some(6)).await;

        ledger.drop_kind(EventKind::ValidatorExited, "node restarted");
        eventually(|| ledger.active_subscriptions_of(EventKind::ValidatorExited) == 0).await;

        ledger.publish(amount_event(EventKind::ValidatorExited, 7, 0, 32));
        ledger.publish(amount_event(EventKind::RewardsSwept, 7, 1, 3));
        ledger.mine(7);

        complete_all(&ledger);
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.degraded, vec![EventKind::ValidatorExited]);
        assert_eq!(summary.resubscriptions, 0);
        assert_eq!(summary.events_applied, 1);
        assert_eq!(summary.unsettled, 1);
        assert_eq!(summary.checkpoint, Some(6));
        assert_eq!(checkpoint.writes(), vec![6]);
        assert_eq!(aggregator.snapshot().swept_rewards, wei(4));
        assert_eq!(aggregator.snapshot().swept_exits, wei(0));
        assert_eq!(ledger.active_subscriptions(), 0);
        assert_eq!(ledger.double_releases(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_within_budget_resubscribes_without_duplicates() {
        let ledger = Arc::new(InMemoryLedger::new());
        let aggregator = ProtocolAggregator::new();
        let (_stop, shutdown) = watch::channel(false);
        let pipeline = IngestionPipeline::new(
            ledger.clone(),
            InMemoryCheckpointStore::new(),
            aggregator.clone(),
            IngestionConfig {
                kinds: vec![EventKind::RewardsSwept],
                ..IngestionConfig::default()
            },
        );
        let run = tokio::spawn(pipeline.run(shutdown));
        eventually(|| ledger.active_subscriptions() == 1).await;

        for block in 1..=3 {
            ledger.publish(amount_event(EventKind::RewardsSwept, block, 0, 1));
        }
        ledger.mine(2);
        eventually(|| aggregator.snapshot().events_applied == 2).await;

        // Resubscription replays from checkpoint + 1 = 3; block 3 is a duplicate.
        ledger.drop_kind(EventKind::RewardsSwept, "socket reset");
        eventually(|| ledger.subscribe_calls() == 2).await;
        ledger.publish(amount_event(EventKind::RewardsSwept, 4, 0, 1));
        ledger.mine(4);
        eventually(|| aggregator.snapshot().events_applied == 4).await;

        ledger.complete_kind(EventKind::RewardsSwept);
        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.resubscriptions, 1);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.checkpoint, Some(4));
        assert_eq!(aggregator.snapshot().swept_rewards, wei(4));
    }
}
