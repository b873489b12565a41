//! Pipeline test harness
//!
//! Runs the ingestion loop against an in-memory log and a caller-supplied
//! store, with helpers to wait on acknowledgements and to capture log output.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;
use txn2pg::source::MemoryLog;
use txn2pg::writer::{IdempotentWriter, TransactionStore};
use txn2pg::{IngestLoop, IngestStats, MessageHandler};

pub const WAIT: Duration = Duration::from_secs(5);

/// Read a payload from testdata/
pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("testdata/{}", name))
        .unwrap_or_else(|e| panic!("Failed to read testdata/{}: {}", name, e))
}

/// Build an ingestion loop over `log` and `store`.
pub fn ingest_loop(
    log: Arc<MemoryLog>,
    store: Arc<dyn TransactionStore>,
    fetch_backoff: Duration,
) -> IngestLoop {
    let handler = MessageHandler::new(IdempotentWriter::new(store));
    IngestLoop::new(log, handler, fetch_backoff)
}

/// A running ingestion loop plus the handles needed to drive it.
pub struct Pipeline {
    pub log: Arc<MemoryLog>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<IngestStats>,
}

impl Pipeline {
    pub fn start(store: Arc<dyn TransactionStore>, fetch_backoff: Duration) -> Self {
        let log = Arc::new(MemoryLog::new());
        let ingest = ingest_loop(log.clone(), store, fetch_backoff);
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(async move { ingest.run(rx).await });
        Self {
            log,
            shutdown,
            task,
        }
    }

    pub async fn wait_for_acks(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.log.acknowledged().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} acknowledgements, saw {}",
                count,
                self.log.acknowledged().len()
            )
        });
    }

    pub async fn stop(self) -> IngestStats {
        self.shutdown.send(true).expect("loop dropped its receiver");
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("loop did not stop in time")
            .expect("loop task panicked")
    }
}

/// Collects formatted log lines from a scoped subscriber.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Install as the default subscriber for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Lines containing `needle`.
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}
