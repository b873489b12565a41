// Exists-then-create persistence for transaction records.
//
// The unique index on transaction_id is the last line of defense: a
// duplicate reported by `create` is treated exactly like a row found by
// `exists`. Any other conflict, such as a reused row id, is a failure.

use std::sync::Arc;

use metrics::counter;
use tracing::{error, info, warn};
use txn2pg_core::TransactionRecord;

use super::error::StoreError;
use super::store::TransactionStore;

/// Result of handing one record to the [`IdempotentWriter`].
#[derive(Debug)]
pub enum WriteOutcome {
    /// A new row was created.
    Written { id: String },
    /// A row with this transaction id already exists.
    Skipped,
    /// The record failed validation; no storage call was made.
    Rejected,
    /// The store failed during the existence check or the insert.
    Failed(StoreError),
}

impl WriteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOutcome::Written { .. } => "written",
            WriteOutcome::Skipped => "skipped",
            WriteOutcome::Rejected => "rejected",
            WriteOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Clone)]
pub struct IdempotentWriter {
    store: Arc<dyn TransactionStore>,
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Persist `record` unless its transaction id is already stored.
    pub async fn process(&self, record: &TransactionRecord) -> WriteOutcome {
        let transaction_id = record.transaction_id.as_str();

        if !record.is_valid() {
            warn!(
                transaction_id,
                user_id = record.user_id,
                account_id = %record.account_id,
                amount = record.amount,
                "Invalid transaction data, rejecting"
            );
            counter!("txn2pg.messages.rejected").increment(1);
            return WriteOutcome::Rejected;
        }

        match self.store.exists(transaction_id).await {
            Ok(true) => return self.skipped(transaction_id),
            Ok(false) => {}
            Err(e) => {
                error!(
                    transaction_id,
                    error = %e,
                    "Failed to check transaction existence"
                );
                counter!("txn2pg.messages.failed").increment(1);
                return WriteOutcome::Failed(e);
            }
        }

        if record.has_failed_balance_change() {
            warn!(
                transaction_id,
                balance_before = record.balance_before,
                balance_after = record.balance_after,
                "Failed transaction has balance change"
            );
        }

        match self.store.create(record).await {
            Ok(id) => {
                info!(
                    transaction_id,
                    id = %id,
                    transaction_type = %record.transaction_type,
                    amount = record.amount,
                    "Transaction processed successfully"
                );
                counter!("txn2pg.messages.written").increment(1);
                WriteOutcome::Written { id }
            }
            Err(e) if e.is_duplicate() => self.skipped(transaction_id),
            Err(e) => {
                error!(transaction_id, error = %e, "Failed to create transaction");
                counter!("txn2pg.messages.failed").increment(1);
                WriteOutcome::Failed(e)
            }
        }
    }

    fn skipped(&self, transaction_id: &str) -> WriteOutcome {
        info!(transaction_id, "Transaction already exists, skipping");
        counter!("txn2pg.messages.skipped").increment(1);
        WriteOutcome::Skipped
    }
}
