// Shared fixtures for unit tests.

use std::io::Write;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use txn2pg_core::{TransactionRecord, TransactionStatus, TransactionType};

/// Collects formatted log lines from a scoped subscriber.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub(crate) struct CaptureGuard {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureGuard;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureGuard {
            buffer: self.buffer.clone(),
        }
    }
}

impl Write for CaptureGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .finish()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

pub(crate) fn sample_record(transaction_id: &str) -> TransactionRecord {
    let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
    TransactionRecord {
        id: "trans-id-123".to_string(),
        user_id: 456,
        account_id: "account-456".to_string(),
        transaction_id: transaction_id.to_string(),
        transaction_type: TransactionType::Topup,
        transaction_status: TransactionStatus::Success,
        amount: 250.75,
        balance_before: 1000.0,
        balance_after: 1250.75,
        currency: "IDR".to_string(),
        description: Some("Test transaction".to_string()),
        external_reference: None,
        payment_method: None,
        metadata: None,
        is_accessible_from_external: true,
        created_at: ts,
        updated_at: ts,
    }
}

/// JSON payload as a producer would publish it, amount in minor units.
pub(crate) fn sample_payload(transaction_id: &str) -> Vec<u8> {
    json!({
        "id": format!("{}-id", transaction_id),
        "userId": 456,
        "accountId": "account-456",
        "transactionId": transaction_id,
        "transactionType": "TOPUP",
        "transactionStatus": "SUCCESS",
        "amount": 25075,
        "balanceBefore": 1000.00,
        "balanceAfter": 1250.75,
        "currency": "IDR",
        "description": "Test transaction",
        "isAccessibleFromExternal": true,
        "createdAt": [2024, 1, 15, 10, 30, 45],
        "updatedAt": [2024, 1, 15, 10, 30, 45, 0]
    })
    .to_string()
    .into_bytes()
}
