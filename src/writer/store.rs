use async_trait::async_trait;
use txn2pg_core::TransactionRecord;
use uuid::Uuid;

use super::error::Result;

/// Durable home for persisted transactions, keyed by transaction id.
///
/// Implementations must enforce uniqueness of `transaction_id` and report a
/// conflicting insert as [`StoreError::Duplicate`](super::StoreError::Duplicate)
/// rather than a generic failure.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Whether a row with this transaction id has already been persisted.
    async fn exists(&self, transaction_id: &str) -> Result<bool>;

    /// Insert the record and return the id of the new row.
    async fn create(&self, record: &TransactionRecord) -> Result<String>;

    /// Fetch a persisted row. The returned record's `id` is the row id.
    async fn get_by_transaction_id(&self, transaction_id: &str)
        -> Result<Option<TransactionRecord>>;
}

/// Row id for a new record: its external id, or a fresh UUID when it has none.
pub(crate) fn row_id_for(record: &TransactionRecord) -> String {
    if record.id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        record.id.clone()
    }
}
