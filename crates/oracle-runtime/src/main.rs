//! # Staking Oracle
//!
//! Entry point. Configuration comes from `ORACLE_*` environment variables (see
//! [`oracle_runtime::config`]); log filtering from `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oracle_runtime::{OracleConfig, OracleRuntime, StopCause};
use so_01_resilient_transport::{HttpJsonRpc, ResilientTransport, RetryingRpc};
use so_02_event_ingestion::{FileCheckpointStore, WsLedgerSubscriber};
use so_03_upkeep_oracle::RpcUpkeepContract;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Per-attempt HTTP timeout.
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = OracleConfig::from_env().context("loading configuration")?;
    info!("===========================================");
    info!("  Staking Oracle v{}", env!("CARGO_PKG_VERSION"));
    info!("  Contract:    {}", config.contract);
    info!("  Transmitter: {}", config.transmitter);
    info!("  RPC:         {}", config.rpc_url);
    info!("  WebSocket:   {}", config.ws_url);
    info!("===========================================");

    // A corrupt or already-locked checkpoint stops the process here.
    let checkpoint = FileCheckpointStore::open(&config.checkpoint_path).map_err(|e| {
        error!(error = %e, "[so-02] Cannot open checkpoint");
        e
    })?;

    let rpc = Arc::new(RetryingRpc::new(
        HttpJsonRpc::new(config.rpc_url.clone(), RPC_REQUEST_TIMEOUT)
            .context("building RPC client")?,
        ResilientTransport::new(config.retry_policy()),
    ));
    let ledger = Arc::new(WsLedgerSubscriber::new(
        config.ws_url.clone(),
        config.contract,
        rpc.clone(),
    ));
    let contract = Arc::new(RpcUpkeepContract::new(rpc, config.contract, config.transmitter));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = OracleRuntime::new(config, ledger, contract, checkpoint).spawn(shutdown_rx)?;

    info!("Oracle is running. Press Ctrl+C to stop.");
    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C, shutting down");
        }
    };
    let report = tasks.supervise(&shutdown_tx, signal).await?;
    info!(
        cause = ?report.cause,
        upkeep_cycles = report.upkeep.cycles,
        reports_submitted = report.upkeep.submitted,
        "Shutdown complete"
    );

    if let Err(e) = report.ingestion {
        return Err(e).context("ingestion stopped with an error");
    }
    if let Err(e) = report.forwarded {
        return Err(e).context("fulfillment forwarder stopped with an error");
    }
    if report.cause != StopCause::Signal {
        anyhow::bail!("oracle task exited unexpectedly ({:?})", report.cause);
    }
    Ok(())
}
