// txn2pg - transaction events from Kafka into PostgreSQL
//
// The pipeline is a single ingestion loop: fetch a message, decode and
// translate it, write it idempotently, acknowledge it. Everything here wires
// that loop to configuration and to the process lifecycle.

pub mod config;
pub mod handlers;
pub mod ingest;
pub mod init;
pub mod source;
pub mod writer;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use txn2pg_core::TransactionRecord;

pub use config::RuntimeConfig;
pub use handlers::{MessageDisposition, MessageError, MessageHandler};
pub use ingest::{IngestLoop, IngestStats};
pub use writer::{IdempotentWriter, TransactionStore, WriteOutcome};

/// Graceful shutdown handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Run `ingest` until `signal` resolves, then give in-flight work `grace`
/// to finish.
///
/// Returns the loop's stats, or `None` when the grace period ran out first.
pub async fn run_until<F>(ingest: IngestLoop, grace: Duration, signal: F) -> Result<Option<IngestStats>>
where
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(async move { ingest.run(shutdown_rx).await });

    tokio::select! {
        joined = &mut task => {
            let stats = joined.context("Ingestion task failed")?;
            return Ok(Some(stats));
        }
        _ = signal => {}
    }

    // Receiver may already be gone if the loop exited in the meantime
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(grace, task).await {
        Ok(joined) => Ok(Some(joined.context("Ingestion task failed")?)),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "Shutdown grace period elapsed before in-flight work finished"
            );
            Ok(None)
        }
    }
}

/// Run the pipeline with a resolved configuration until SIGINT/SIGTERM.
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    config.log_summary();

    let store = init::init_store(&config.storage).await?;
    let source = init::init_source(&config.kafka)?;

    let handler = MessageHandler::new(IdempotentWriter::new(store));
    let ingest = IngestLoop::new(source, handler, config.ingest.fetch_backoff());

    info!("txn2pg started, waiting for transactions");
    if let Some(stats) = run_until(ingest, config.ingest.shutdown_grace(), shutdown_signal()).await? {
        info!(
            fetched = stats.fetched,
            written = stats.written,
            acknowledged = stats.acknowledged(),
            "Shutdown complete"
        );
    }
    Ok(())
}

/// Fetch one persisted transaction by its transaction id from the store
/// selected by `config`.
pub async fn lookup(config: &RuntimeConfig, transaction_id: &str) -> Result<Option<TransactionRecord>> {
    let store = init::init_store(&config.storage).await?;
    find_transaction(store.as_ref(), transaction_id).await
}

pub async fn find_transaction(
    store: &dyn TransactionStore,
    transaction_id: &str,
) -> Result<Option<TransactionRecord>> {
    store
        .get_by_transaction_id(transaction_id)
        .await
        .with_context(|| format!("Failed to look up transaction {}", transaction_id))
}
