// Ingestion loop
//
// One message in flight at a time: fetch -> handle -> acknowledge. The
// shutdown flag is checked before every fetch and interrupts a blocked fetch
// or a backoff sleep. A message that is already being handled is allowed to
// finish and is acknowledged before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::handlers::{MessageDisposition, MessageError, MessageHandler};
use crate::source::{Delivery, LogSource};

/// Per-run counters, returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: u64,
    pub written: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub failed: u64,
    pub malformed: u64,
    pub fetch_errors: u64,
    pub ack_errors: u64,
}

impl IngestStats {
    fn record(&mut self, result: &Result<MessageDisposition, MessageError>) {
        match result {
            Ok(MessageDisposition::Written { .. }) => self.written += 1,
            Ok(MessageDisposition::Skipped) => self.skipped += 1,
            Ok(MessageDisposition::Rejected) => self.rejected += 1,
            Err(MessageError::Malformed(_)) => self.malformed += 1,
            Err(MessageError::Storage(_)) => self.failed += 1,
        }
    }

    /// Messages whose cursor position has been handed to the source.
    pub fn acknowledged(&self) -> u64 {
        self.fetched - self.ack_errors
    }
}

pub struct IngestLoop {
    source: Arc<dyn LogSource>,
    handler: MessageHandler,
    fetch_backoff: Duration,
}

impl IngestLoop {
    pub fn new(source: Arc<dyn LogSource>, handler: MessageHandler, fetch_backoff: Duration) -> Self {
        Self {
            source,
            handler,
            fetch_backoff,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> IngestStats {
        let mut stats = IngestStats::default();
        info!(
            fetch_backoff_ms = self.fetch_backoff.as_millis() as u64,
            "Starting transaction ingestion"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                fetched = self.source.fetch_next() => fetched,
            };

            let delivery = match fetched {
                Ok(delivery) => delivery,
                Err(e) => {
                    stats.fetch_errors += 1;
                    counter!("txn2pg.fetch.errors").increment(1);
                    error!(
                        error = %e,
                        backoff_ms = self.fetch_backoff.as_millis() as u64,
                        "Failed to fetch message"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.fetch_backoff) => continue,
                    }
                }
            };

            stats.fetched += 1;
            counter!("txn2pg.messages.fetched").increment(1);
            self.process(&delivery, &mut stats).await;
        }

        info!(
            fetched = stats.fetched,
            written = stats.written,
            skipped = stats.skipped,
            rejected = stats.rejected,
            failed = stats.failed,
            malformed = stats.malformed,
            fetch_errors = stats.fetch_errors,
            "Transaction ingestion stopped"
        );
        stats
    }

    async fn process(&self, delivery: &Delivery, stats: &mut IngestStats) {
        let result = self.handler.handle(delivery).await;
        stats.record(&result);

        if let Err(e) = &result {
            error!(
                partition = delivery.token.partition,
                offset = delivery.token.offset,
                kind = e.kind(),
                transient = e.is_transient(),
                error = %e,
                "Failed to process message"
            );
        }

        // Acknowledged whatever the outcome. A storage failure is not retried
        // here; the message must be replayed out of band.
        if let Err(e) = self.source.acknowledge(delivery.token).await {
            stats.ack_errors += 1;
            counter!("txn2pg.ack.errors").increment(1);
            warn!(
                partition = delivery.token.partition,
                offset = delivery.token.offset,
                error = %e,
                "Failed to commit message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryLog;
    use crate::test_support::{sample_payload, LogCapture};
    use crate::writer::{IdempotentWriter, MemoryStore, StoreError, TransactionStore};
    use async_trait::async_trait;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use txn2pg_core::TransactionRecord;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        log: Arc<MemoryLog>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<IngestStats>,
    }

    impl Harness {
        fn start(store: Arc<dyn TransactionStore>, backoff: Duration) -> Self {
            let log = Arc::new(MemoryLog::new());
            let handler = MessageHandler::new(IdempotentWriter::new(store));
            let ingest = IngestLoop::new(log.clone(), handler, backoff);
            let (shutdown, rx) = watch::channel(false);
            let task = tokio::spawn(async move { ingest.run(rx).await });
            Self {
                log,
                shutdown,
                task,
            }
        }

        async fn wait_for_acks(&self, count: usize) {
            timeout(WAIT, async {
                while self.log.acknowledged().len() < count {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("messages were not acknowledged in time");
        }

        async fn stop(self) -> IngestStats {
            self.shutdown.send(true).unwrap();
            timeout(WAIT, self.task)
                .await
                .expect("loop did not stop in time")
                .unwrap()
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl TransactionStore for BrokenStore {
        async fn exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        async fn create(&self, _: &TransactionRecord) -> Result<String, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        async fn get_by_transaction_id(
            &self,
            _: &str,
        ) -> Result<Option<TransactionRecord>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_malformed_then_valid_advances_past_both() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::start(store.clone(), Duration::from_millis(10));

        harness.log.publish("{this is not json");
        harness.log.publish(sample_payload("trans-456"));
        harness.wait_for_acks(2).await;

        assert_eq!(harness.log.committed_offset(), Some(2));
        let stats = harness.stop().await;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.written, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].transaction_id, "trans-456");
    }

    #[tokio::test]
    async fn test_duplicate_delivery_writes_once() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::start(store.clone(), Duration::from_millis(10));

        harness.log.publish(sample_payload("trans-456"));
        harness.log.publish(sample_payload("trans-456"));
        harness.wait_for_acks(2).await;

        let stats = harness.stop().await;
        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.acknowledged(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_still_acknowledged() {
        let harness = Harness::start(Arc::new(BrokenStore), Duration::from_millis(10));

        harness.log.publish(sample_payload("trans-1"));
        harness.log.publish(sample_payload("trans-2"));
        harness.wait_for_acks(2).await;

        assert_eq!(harness.log.committed_offset(), Some(2));
        let stats = harness.stop().await;
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn test_fetch_failures_back_off_and_retry() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::start(store.clone(), Duration::from_millis(20));

        harness.log.fail_next_fetches(2);
        harness.log.publish(sample_payload("trans-456"));
        harness.wait_for_acks(1).await;

        let stats = harness.stop().await;
        assert_eq!(stats.fetch_errors, 2);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.acknowledged(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_fetch() {
        let harness = Harness::start(Arc::new(MemoryStore::new()), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = harness.stop().await;
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff_sleep() {
        let harness = Harness::start(Arc::new(MemoryStore::new()), Duration::from_secs(3600));
        harness.log.fail_next_fetches(1);

        timeout(WAIT, async {
            while harness.log.fetch_attempts() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let stats = harness.stop().await;
        assert_eq!(stats.fetch_errors, 1);
        assert_eq!(stats.fetched, 0);
    }

    #[tokio::test]
    async fn test_no_fetch_after_shutdown_requested() {
        let log = Arc::new(MemoryLog::new());
        log.publish(sample_payload("trans-456"));

        let store = Arc::new(MemoryStore::new());
        let ingest = IngestLoop::new(
            log.clone(),
            MessageHandler::new(IdempotentWriter::new(store.clone())),
            Duration::from_millis(10),
        );
        let (_tx, rx) = watch::channel(true);

        let stats = ingest.run(rx).await;
        assert_eq!(stats.fetched, 0);
        assert_eq!(log.pending(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_logged_at_error_level() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let log = Arc::new(MemoryLog::new());
        log.publish("not json");
        let ingest = IngestLoop::new(
            log.clone(),
            MessageHandler::new(IdempotentWriter::new(Arc::new(MemoryStore::new()))),
            Duration::from_millis(10),
        );
        let (tx, rx) = watch::channel(false);

        // Single-threaded runtime: run the loop inline and stop it from a
        // concurrently polled future once the message is acknowledged.
        let stop = async {
            while log.acknowledged().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tx.send(true).unwrap();
        };
        let (stats, ()) = tokio::join!(ingest.run(rx), stop);

        assert_eq!(stats.malformed, 1);
        let logs = capture.contents();
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("Failed to process message"));
        assert!(logs.contains("kind=\"malformed\""));
    }
}
